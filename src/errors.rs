//! Typed error hierarchy for the compaction engine.
//!
//! Four enums cover the collaborator boundaries:
//! - `TokenizerError`: a pluggable tokenizer could not count a string
//! - `StoreError`: summary persistence failures
//! - `LlmError`: completion endpoint failures
//! - `SummarizeError`: background summarization failures (wraps the above)
//!
//! None of these ever reach the request/response path: the inlet absorbs
//! store errors and the outlet reports them through `SummaryOutcome`.

use thiserror::Error;

/// A tokenizer failed to count a string. The estimator falls back to the
/// character heuristic whenever this is returned.
#[derive(Debug, Error)]
#[error("Tokenizer '{name}' failed: {message}")]
pub struct TokenizerError {
    pub name: String,
    pub message: String,
}

/// Errors from the summary store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[source] anyhow::Error),

    #[error("Store lock poisoned")]
    LockPoisoned,

    #[error("Invalid compacted_through value {value} for conversation {conversation_id}")]
    InvalidProgress { conversation_id: String, value: i64 },

    #[error("compacted_through {value} for conversation {conversation_id} exceeds the storable range")]
    ProgressOutOfRange { conversation_id: String, value: usize },
}

/// Errors from the LLM completion collaborator.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP request to completion endpoint failed: {0}")]
    Http(#[source] reqwest::Error),

    #[error("Completion endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode completion response: {0}")]
    Decode(String),

    #[error("Completion response contained no choices")]
    NoChoices,
}

/// Errors from a single background summarization attempt.
#[derive(Debug, Error)]
pub enum SummarizeError {
    #[error("No usable summarizer model configured")]
    NoSummarizerModel,

    #[error("Conversation owner {owner_id} could not be resolved")]
    UnknownOwner { owner_id: String },

    #[error("Summarizer returned an empty summary")]
    EmptySummary,

    #[error("Blocking task failed: {0}")]
    Task(String),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SummarizeError {
    /// Configuration problems are skipped quietly; everything else is a
    /// collaborator failure.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            SummarizeError::NoSummarizerModel | SummarizeError::UnknownOwner { .. }
        )
    }
}

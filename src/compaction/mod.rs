//! Context Compaction
//!
//! Keeps long conversations inside a model's context window by replacing older
//! messages with a rolling summary.
//!
//! ## Features
//!
//! - **Views**: protected head + summary + recent tail, built per request
//! - **Hard caps**: structure-aware trimming, then FIFO eviction of the tail
//! - **Background summarization**: folds the middle of the transcript into the
//!   stored summary after each response, serialized per conversation
//! - **Per-model thresholds**: overrides inherited through base models
//!
//! ## Configuration
//!
//! Limits are configured in `.condenser/condenser.toml`:
//!
//! ```toml
//! [compaction]
//! compression_threshold_tokens = 64000
//! hard_cap_tokens = 120000
//! keep_first = 1
//! keep_last = 6
//!
//! [compaction.overrides."gpt-4o"]
//! hard_cap_tokens = 110000
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use condenser::compaction::{TokenEstimator, ViewBuilder};
//!
//! let estimator = TokenEstimator::heuristic();
//! let view = ViewBuilder::new(&settings, &estimator)
//!     .build(&transcript, summary.as_ref(), resolver.resolve(model), None);
//! ```

mod budget;
mod estimator;
mod message;
mod prompt;
mod thresholds;
mod trim;
mod view;
mod worker;

pub use budget::{BudgetEnforcer, EnforcementReport};
pub use estimator::{
    CHARS_PER_TOKEN, HEURISTIC_TOKENIZER, HeuristicTokenizer, TokenEstimator, Tokenizer,
};
#[cfg(feature = "tiktoken")]
pub use estimator::TiktokenTokenizer;
pub use message::{Content, ContentPart, Message, Role};
pub use prompt::{build_summary_messages, format_transcript, summary_instruction};
pub use thresholds::{ThresholdResolver, ThresholdSource, Thresholds};
pub use trim::{COLLAPSE_MARKER, MAX_RETAINED_RATIO, MIN_TRIM_CHARS, collapse_text, trim_message};
pub use view::{
    BuiltView, CompactionPlan, SUMMARY_HEADER, ViewBuilder, ViewStats, effective_keep_first,
    summary_applies, synthesize_summary_message, target_compacted_through,
};
pub use worker::{
    ConversationGuard, ConversationLocks, SkipReason, SummarizationWorker, SummaryJob,
    SummaryOutcome, SummaryTask,
};

//! Persistence for rolling conversation summaries.
//!
//! One row per conversation holds the latest summary and the number of
//! transcript messages it covers (`compacted_through`). Progress only moves
//! forward: a save whose `compacted_through` is not strictly greater than the
//! stored value is discarded and reported as [`SaveOutcome::Stale`].
//!
//! - [`SqliteSummaryStore`]: durable store, I/O on tokio's blocking pool
//! - [`InMemorySummaryStore`]: same guard, for tests and embedding

mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::errors::StoreError;

pub use sqlite::{SqliteSummaryStore, SummaryDb};

/// The persisted summary for one conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub conversation_id: String,
    pub summary_text: String,
    /// Number of original transcript messages the summary covers.
    pub compacted_through: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of a save attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveOutcome {
    /// First summary for the conversation.
    Inserted,
    /// Existing summary replaced with further progress.
    Updated,
    /// Discarded: stored progress was already greater or equal.
    Stale,
}

impl SaveOutcome {
    pub fn is_applied(self) -> bool {
        !matches!(self, SaveOutcome::Stale)
    }
}

/// Storage for conversation summaries.
#[async_trait]
pub trait SummaryStore: Send + Sync {
    /// Load the summary for a conversation, if one exists.
    ///
    /// # Errors
    /// Returns an error if the store cannot be read.
    async fn load(&self, conversation_id: &str) -> Result<Option<ConversationSummary>, StoreError>;

    /// Upsert a summary, discarding it unless `compacted_through` advances.
    ///
    /// # Errors
    /// Returns an error if the store cannot be written.
    async fn save(
        &self,
        conversation_id: &str,
        summary_text: &str,
        compacted_through: usize,
    ) -> Result<SaveOutcome, StoreError>;
}

/// In-memory summary store.
#[derive(Debug, Default)]
pub struct InMemorySummaryStore {
    rows: RwLock<HashMap<String, ConversationSummary>>,
}

impl InMemorySummaryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored summaries.
    pub fn len(&self) -> usize {
        self.rows.read().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SummaryStore for InMemorySummaryStore {
    async fn load(&self, conversation_id: &str) -> Result<Option<ConversationSummary>, StoreError> {
        let rows = self.rows.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(rows.get(conversation_id).cloned())
    }

    async fn save(
        &self,
        conversation_id: &str,
        summary_text: &str,
        compacted_through: usize,
    ) -> Result<SaveOutcome, StoreError> {
        let mut rows = self.rows.write().map_err(|_| StoreError::LockPoisoned)?;
        let now = Utc::now();

        match rows.get_mut(conversation_id) {
            Some(existing) if compacted_through <= existing.compacted_through => {
                Ok(SaveOutcome::Stale)
            }
            Some(existing) => {
                existing.summary_text = summary_text.to_string();
                existing.compacted_through = compacted_through;
                existing.updated_at = now;
                Ok(SaveOutcome::Updated)
            }
            None => {
                rows.insert(
                    conversation_id.to_string(),
                    ConversationSummary {
                        conversation_id: conversation_id.to_string(),
                        summary_text: summary_text.to_string(),
                        compacted_through,
                        created_at: now,
                        updated_at: now,
                    },
                );
                Ok(SaveOutcome::Inserted)
            }
        }
    }
}

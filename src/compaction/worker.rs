//! Background summarization after a completed response.
//!
//! Each completed turn spawns one task that may fold the middle of the
//! transcript into the stored summary. Tasks for the same conversation are
//! serialized by [`ConversationLocks`]; a task that finds the stored summary
//! already covers its target skips without calling the model.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OwnedMutexGuard;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::estimator::TokenEstimator;
use super::message::Message;
use super::prompt;
use super::thresholds::ThresholdResolver;
use super::view::target_compacted_through;
use crate::config::CompactionSettings;
use crate::errors::SummarizeError;
use crate::identity::UserDirectory;
use crate::llm::{CompletionClient, CompletionRequest};
use crate::store::{SaveOutcome, SummaryStore};

/// Input for one summarization attempt.
#[derive(Debug, Clone)]
pub struct SummaryJob {
    pub conversation_id: String,
    /// Model that served the conversation. Used for thresholds and as the
    /// summarizer when none is configured.
    pub model_id: String,
    pub owner_id: Option<String>,
    /// Full transcript including the latest response.
    pub transcript: Vec<Message>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    BelowThreshold { tokens: usize, threshold: usize },
    EmptyMiddle,
    AlreadyCovered { stored: usize, target: usize },
    Configuration(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::BelowThreshold { tokens, threshold } => {
                write!(f, "below threshold ({} < {} tokens)", tokens, threshold)
            }
            SkipReason::EmptyMiddle => write!(f, "nothing between head and tail to summarize"),
            SkipReason::AlreadyCovered { stored, target } => {
                write!(f, "already covered (stored {} >= target {})", stored, target)
            }
            SkipReason::Configuration(msg) => write!(f, "configuration: {}", msg),
        }
    }
}

/// Result of a background summarization task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummaryOutcome {
    Skipped(SkipReason),
    Saved {
        compacted_through: usize,
        outcome: SaveOutcome,
    },
    /// The summary was generated but a newer one had already been stored.
    Discarded { compacted_through: usize },
    Failed(String),
}

impl fmt::Display for SummaryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SummaryOutcome::Skipped(reason) => write!(f, "skipped: {}", reason),
            SummaryOutcome::Saved {
                compacted_through,
                outcome,
            } => write!(
                f,
                "saved ({:?}), compacted through message {}",
                outcome, compacted_through
            ),
            SummaryOutcome::Discarded { compacted_through } => write!(
                f,
                "discarded, stored summary already past message {}",
                compacted_through
            ),
            SummaryOutcome::Failed(e) => write!(f, "failed: {}", e),
        }
    }
}

/// Per-conversation async mutexes. Entries are removed once no task holds
/// or waits on them.
#[derive(Debug, Clone, Default)]
pub struct ConversationLocks {
    inner: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl ConversationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, conversation_id: &str) -> ConversationGuard {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            map.entry(conversation_id.to_string())
                .or_default()
                .clone()
        };
        let guard = lock.lock_owned().await;
        ConversationGuard {
            conversation_id: conversation_id.to_string(),
            locks: self.clone(),
            guard: Some(guard),
        }
    }

    /// Number of conversations with a live lock entry.
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Held while a task works on one conversation.
pub struct ConversationGuard {
    conversation_id: String,
    locks: ConversationLocks,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ConversationGuard {
    fn drop(&mut self) {
        self.guard.take();
        let mut map = self
            .locks
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if map
            .get(&self.conversation_id)
            .is_some_and(|entry| Arc::strong_count(entry) == 1)
        {
            map.remove(&self.conversation_id);
        }
    }
}

/// Handle to a spawned summarization. Dropping it detaches the task.
#[derive(Debug)]
pub struct SummaryTask {
    conversation_id: String,
    handle: JoinHandle<SummaryOutcome>,
}

impl SummaryTask {
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the task to finish.
    pub async fn join(self) -> SummaryOutcome {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(e) => SummaryOutcome::Failed(format!("Summarization task failed: {}", e)),
        }
    }
}

pub struct SummarizationWorker {
    settings: CompactionSettings,
    thresholds: Arc<ThresholdResolver>,
    estimator: TokenEstimator,
    store: Arc<dyn SummaryStore>,
    llm: Arc<dyn CompletionClient>,
    users: Arc<dyn UserDirectory>,
    locks: ConversationLocks,
}

impl SummarizationWorker {
    pub fn new(
        settings: CompactionSettings,
        thresholds: Arc<ThresholdResolver>,
        estimator: TokenEstimator,
        store: Arc<dyn SummaryStore>,
        llm: Arc<dyn CompletionClient>,
        users: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            settings,
            thresholds,
            estimator,
            store,
            llm,
            users,
            locks: ConversationLocks::new(),
        }
    }

    pub fn locks(&self) -> &ConversationLocks {
        &self.locks
    }

    /// Run `job` on a new tokio task.
    pub fn spawn(self: &Arc<Self>, job: SummaryJob) -> SummaryTask {
        let worker = Arc::clone(self);
        let conversation_id = job.conversation_id.clone();
        let handle = tokio::spawn(async move { worker.run(job).await });
        SummaryTask {
            conversation_id,
            handle,
        }
    }

    /// Run one summarization attempt. Never returns an error: failures are
    /// logged and reported in the outcome.
    pub async fn run(&self, job: SummaryJob) -> SummaryOutcome {
        let conversation_id = job.conversation_id.clone();
        match self.summarize(job).await {
            Ok(outcome) => {
                match &outcome {
                    SummaryOutcome::Saved {
                        compacted_through, ..
                    } => info!(
                        conversation_id = %conversation_id,
                        compacted_through,
                        "Saved conversation summary"
                    ),
                    SummaryOutcome::Discarded { compacted_through } => info!(
                        conversation_id = %conversation_id,
                        compacted_through,
                        "Discarded stale summary"
                    ),
                    other => debug!(conversation_id = %conversation_id, outcome = %other, "Summarization skipped"),
                }
                outcome
            }
            Err(e) if e.is_configuration() => {
                warn!(conversation_id = %conversation_id, error = %e, "Skipping summarization");
                SummaryOutcome::Skipped(SkipReason::Configuration(e.to_string()))
            }
            Err(e) => {
                warn!(conversation_id = %conversation_id, error = %e, "Summarization failed");
                SummaryOutcome::Failed(e.to_string())
            }
        }
    }

    async fn summarize(&self, job: SummaryJob) -> Result<SummaryOutcome, SummarizeError> {
        let SummaryJob {
            conversation_id,
            model_id,
            owner_id,
            transcript,
        } = job;

        let target = target_compacted_through(transcript.len(), self.settings.keep_last);
        let thresholds = self.thresholds.resolve(&model_id);

        let estimator = self.estimator.clone();
        let (transcript, tokens) = tokio::task::spawn_blocking(move || {
            let tokens = estimator.estimate_messages(&transcript);
            (transcript, tokens)
        })
        .await
        .map_err(|e| SummarizeError::Task(e.to_string()))?;

        if tokens < thresholds.compression_threshold {
            return Ok(SummaryOutcome::Skipped(SkipReason::BelowThreshold {
                tokens,
                threshold: thresholds.compression_threshold,
            }));
        }

        let start = self.settings.keep_first.min(target);
        if start >= target {
            return Ok(SummaryOutcome::Skipped(SkipReason::EmptyMiddle));
        }

        let summarizer_model = self
            .settings
            .summarizer_model_id
            .clone()
            .filter(|m| !m.trim().is_empty())
            .or_else(|| Some(model_id).filter(|m| !m.trim().is_empty()))
            .ok_or(SummarizeError::NoSummarizerModel)?;

        let owner = match owner_id {
            Some(id) => Some(
                self.users
                    .get_user(&id)
                    .await
                    .ok_or(SummarizeError::UnknownOwner { owner_id: id })?,
            ),
            None => None,
        };

        let _guard = self.locks.acquire(&conversation_id).await;

        let previous = self.store.load(&conversation_id).await?;
        if let Some(stored) = &previous
            && stored.compacted_through >= target
        {
            return Ok(SummaryOutcome::Skipped(SkipReason::AlreadyCovered {
                stored: stored.compacted_through,
                target,
            }));
        }

        let cap = self
            .settings
            .summarizer_hard_cap_override
            .unwrap_or_else(|| self.thresholds.resolve(&summarizer_model).hard_cap);
        let max_tokens = self.settings.max_summary_tokens;
        let reserve = max_tokens + self.estimator.estimate(&prompt::summary_instruction(max_tokens));

        let (middle, evicted, middle_tokens) = self.fit_middle(&transcript[start..target], reserve, cap);
        if evicted > 0 {
            debug!(
                conversation_id = %conversation_id,
                evicted,
                cap,
                "Evicted oldest middle messages to fit summarizer"
            );
        }

        let previous_text = previous
            .as_ref()
            .filter(|_| evicted > 0)
            .map(|p| p.summary_text.as_str())
            .filter(|text| middle_tokens + reserve + self.estimator.estimate(text) <= cap);

        let request = CompletionRequest {
            model: summarizer_model,
            messages: prompt::build_summary_messages(middle, previous_text, max_tokens),
            max_tokens,
            temperature: self.settings.summary_temperature,
            stream: false,
            user: owner.map(|u| u.id),
        };

        let response = self.llm.complete(request).await?;
        let summary = response
            .content()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .ok_or(SummarizeError::EmptySummary)?;

        let saved = self.store.save(&conversation_id, summary, target).await?;
        Ok(if saved.is_applied() {
            SummaryOutcome::Saved {
                compacted_through: target,
                outcome: saved,
            }
        } else {
            SummaryOutcome::Discarded {
                compacted_through: target,
            }
        })
    }

    /// Drop messages from the front of `middle` until it fits `cap` with
    /// `reserve` left over. At least one message is always kept.
    fn fit_middle<'m>(
        &self,
        middle: &'m [Message],
        reserve: usize,
        cap: usize,
    ) -> (&'m [Message], usize, usize) {
        let mut tokens = self.estimator.estimate_messages(middle);
        let mut start = 0;
        while tokens + reserve > cap && middle.len() - start > 1 {
            tokens = tokens.saturating_sub(self.estimator.estimate_message(&middle[start]));
            start += 1;
        }
        (&middle[start..], start, tokens)
    }
}

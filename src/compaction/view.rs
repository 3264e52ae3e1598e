//! Builds the compacted view of a transcript sent to the model.
//!
//! A view is `kept_head + [summary] + kept_tail`: the protected head
//! (configured `keep_first` messages, extended to cover every system message),
//! an optional synthesized summary message, and the messages the summary does
//! not yet cover. When the view exceeds the model's hard cap, the tail is run
//! through the [`BudgetEnforcer`].
//!
//! Building a view is pure: the same transcript and summary always yield the
//! same view.

use serde::Serialize;
use tracing::debug;

use super::budget::{BudgetEnforcer, EnforcementReport};
use super::estimator::TokenEstimator;
use super::message::Message;
use super::thresholds::Thresholds;
use crate::config::CompactionSettings;
use crate::store::ConversationSummary;

/// First line of every synthesized summary message.
pub const SUMMARY_HEADER: &str = "[Summary of earlier conversation]";

/// Wrap stored summary text into the message placed between head and tail.
pub fn synthesize_summary_message(summary_text: &str) -> Message {
    Message::user(format!("{}\n\n{}", SUMMARY_HEADER, summary_text))
}

/// `max(keep_first, index_of_last_system + 1)`, clamped to the transcript.
pub fn effective_keep_first(transcript: &[Message], keep_first: usize) -> usize {
    let after_last_system = transcript
        .iter()
        .rposition(Message::is_system)
        .map_or(0, |i| i + 1);
    keep_first.max(after_last_system).min(transcript.len())
}

/// Progress the next summary for this transcript should record.
pub fn target_compacted_through(transcript_len: usize, keep_last: usize) -> usize {
    transcript_len.saturating_sub(keep_last)
}

/// A summary only applies while it leaves at least one message uncovered.
/// Progress at or past the transcript end means it was built on another
/// branch of the conversation.
pub fn summary_applies(summary: &ConversationSummary, transcript_len: usize) -> bool {
    summary.compacted_through < transcript_len
}

/// The three segments of a view before budget enforcement.
#[derive(Debug, Clone, PartialEq)]
pub struct CompactionPlan {
    pub kept_head: Vec<Message>,
    pub summary_message: Option<Message>,
    pub kept_tail: Vec<Message>,
}

impl CompactionPlan {
    /// Split `transcript` around the stored summary.
    ///
    /// `system_prompt` is the model's configured prompt; it is prepended to
    /// the head only when the transcript carries no system message of its own.
    /// A summary that does not apply to this transcript is ignored.
    pub fn new(
        transcript: &[Message],
        summary: Option<&ConversationSummary>,
        keep_first: usize,
        system_prompt: Option<&str>,
    ) -> Self {
        let head_len = effective_keep_first(transcript, keep_first);

        let mut kept_head = Vec::with_capacity(head_len + 1);
        if let Some(prompt) = system_prompt
            && !transcript.iter().any(Message::is_system)
        {
            kept_head.push(Message::system(prompt));
        }
        kept_head.extend_from_slice(&transcript[..head_len]);

        let (summary_message, tail_start) = match summary {
            Some(s) if summary_applies(s, transcript.len()) => (
                Some(synthesize_summary_message(&s.summary_text)),
                s.compacted_through.max(head_len),
            ),
            _ => (None, head_len),
        };

        Self {
            kept_head,
            summary_message,
            kept_tail: transcript[tail_start..].to_vec(),
        }
    }

    pub fn len(&self) -> usize {
        self.kept_head.len() + usize::from(self.summary_message.is_some()) + self.kept_tail.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn estimate(&self, estimator: &TokenEstimator) -> usize {
        estimator.estimate_messages(&self.kept_head)
            + self
                .summary_message
                .as_ref()
                .map_or(0, |m| estimator.estimate_message(m))
            + estimator.estimate_messages(&self.kept_tail)
    }

    pub fn into_messages(self) -> Vec<Message> {
        let mut messages = self.kept_head;
        messages.extend(self.summary_message);
        messages.extend(self.kept_tail);
        messages
    }
}

/// Numbers describing a built view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewStats {
    pub original_messages: usize,
    pub view_messages: usize,
    pub tokens: usize,
    pub hard_cap: usize,
    pub compacted_through: Option<usize>,
    pub target_compacted_through: usize,
    pub enforcement: Option<EnforcementReport>,
}

/// A finished view and its stats.
#[derive(Debug, Clone)]
pub struct BuiltView {
    pub messages: Vec<Message>,
    pub stats: ViewStats,
}

/// Assembles views for one engine configuration.
#[derive(Debug, Clone)]
pub struct ViewBuilder<'a> {
    keep_first: usize,
    keep_last: usize,
    estimator: &'a TokenEstimator,
}

impl<'a> ViewBuilder<'a> {
    pub fn new(settings: &CompactionSettings, estimator: &'a TokenEstimator) -> Self {
        Self {
            keep_first: settings.keep_first,
            keep_last: settings.keep_last,
            estimator,
        }
    }

    pub fn build(
        &self,
        transcript: &[Message],
        summary: Option<&ConversationSummary>,
        thresholds: Thresholds,
        system_prompt: Option<&str>,
    ) -> BuiltView {
        let summary = summary.filter(|s| {
            let applies = summary_applies(s, transcript.len());
            if !applies {
                debug!(
                    compacted_through = s.compacted_through,
                    messages = transcript.len(),
                    "Stored summary is ahead of the transcript, ignoring it"
                );
            }
            applies
        });
        let mut plan = CompactionPlan::new(transcript, summary, self.keep_first, system_prompt);
        let mut tokens = plan.estimate(self.estimator);

        let enforcement = if tokens > thresholds.hard_cap {
            let report = BudgetEnforcer::new(self.estimator).enforce(
                &mut plan.kept_tail,
                tokens,
                thresholds.hard_cap,
            );
            debug!(
                tokens_before = report.tokens_before,
                tokens_after = report.tokens_after,
                trimmed = report.trimmed,
                dropped = report.dropped,
                hard_cap = thresholds.hard_cap,
                "Enforced hard cap"
            );
            tokens = report.tokens_after;
            Some(report)
        } else {
            None
        };

        let messages = plan.into_messages();
        BuiltView {
            stats: ViewStats {
                original_messages: transcript.len(),
                view_messages: messages.len(),
                tokens,
                hard_cap: thresholds.hard_cap,
                compacted_through: summary.map(|s| s.compacted_through),
                target_compacted_through: target_compacted_through(
                    transcript.len(),
                    self.keep_last,
                ),
                enforcement,
            },
            messages,
        }
    }
}

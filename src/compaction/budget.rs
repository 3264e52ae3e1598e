//! Hard-cap enforcement over the tail of a view.

use serde::Serialize;
use tracing::debug;

use super::estimator::TokenEstimator;
use super::message::{Message, Role};
use super::trim::{self, MIN_TRIM_CHARS};

/// What the enforcer did to bring a view under its cap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EnforcementReport {
    pub trimmed: usize,
    pub dropped: usize,
    pub tokens_before: usize,
    pub tokens_after: usize,
}

/// Trims, then evicts, tail messages until the view fits the hard cap.
#[derive(Debug, Clone)]
pub struct BudgetEnforcer<'a> {
    estimator: &'a TokenEstimator,
}

impl<'a> BudgetEnforcer<'a> {
    pub fn new(estimator: &'a TokenEstimator) -> Self {
        Self { estimator }
    }

    /// Enforce `hard_cap` on a view whose current total is `total`.
    ///
    /// Only `tail` is modified. Its last message is never trimmed or dropped,
    /// so the result may still exceed the cap when the head alone is too big.
    pub fn enforce(&self, tail: &mut Vec<Message>, total: usize, hard_cap: usize) -> EnforcementReport {
        let mut report = EnforcementReport {
            tokens_before: total,
            ..Default::default()
        };
        let mut total = total;
        // Messages before `start` are evicted; they are removed in one drain.
        let mut start = 0;

        while total > hard_cap && tail.len() - start > 1 {
            if let Some(offset) = self.trim_candidate(&tail[start..]) {
                let idx = start + offset;
                if let Some(content) = trim::trim_message(&tail[idx]) {
                    let before = self.estimator.estimate_message(&tail[idx]);
                    tail[idx].content = content;
                    tail[idx].trimmed = true;
                    let after = self.estimator.estimate_message(&tail[idx]);
                    total = total.saturating_sub(before.saturating_sub(after));
                    report.trimmed += 1;
                    continue;
                }
                debug!(index = idx, "Trim kept too much, evicting instead");
            }

            total = total.saturating_sub(self.estimator.estimate_message(&tail[start]));
            start += 1;
            report.dropped += 1;
        }

        tail.drain(..start);
        report.tokens_after = total;
        report
    }

    /// Oldest untrimmed assistant message worth trimming, excluding the last.
    fn trim_candidate(&self, tail: &[Message]) -> Option<usize> {
        let (_, candidates) = tail.split_last()?;
        candidates
            .iter()
            .position(|m| m.role == Role::Assistant && !m.trimmed && m.text_len() > MIN_TRIM_CHARS)
    }
}

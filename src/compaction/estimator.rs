//! Token estimation for context size calculation.

use std::sync::Arc;

use tracing::debug;

use super::message::Message;
use crate::errors::TokenizerError;

/// Characters per token for the heuristic fallback.
pub const CHARS_PER_TOKEN: usize = 4;

/// Configured name of [`HeuristicTokenizer`].
pub const HEURISTIC_TOKENIZER: &str = "heuristic";

/// A tokenizer that can count tokens for a string.
///
/// Implementations may fail (missing vocabulary, unsupported model); the
/// [`TokenEstimator`] absorbs those failures.
pub trait Tokenizer: Send + Sync {
    fn name(&self) -> &str;

    fn count(&self, text: &str) -> Result<usize, TokenizerError>;
}

/// `chars / 4`, rounded down. Deterministic and infallible.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicTokenizer;

impl HeuristicTokenizer {
    pub fn estimate(text: &str) -> usize {
        text.chars().count() / CHARS_PER_TOKEN
    }
}

impl Tokenizer for HeuristicTokenizer {
    fn name(&self) -> &str {
        HEURISTIC_TOKENIZER
    }

    fn count(&self, text: &str) -> Result<usize, TokenizerError> {
        Ok(Self::estimate(text))
    }
}

/// BPE token counts from `tiktoken-rs`.
#[cfg(feature = "tiktoken")]
pub struct TiktokenTokenizer {
    name: String,
    bpe: tiktoken_rs::CoreBPE,
}

#[cfg(feature = "tiktoken")]
impl TiktokenTokenizer {
    /// Load an encoding by name (`cl100k_base`, `o200k_base`, `p50k_base`)
    /// or by OpenAI model id.
    pub fn new(encoding: &str) -> Result<Self, TokenizerError> {
        let bpe = match encoding {
            "cl100k_base" => tiktoken_rs::cl100k_base(),
            "o200k_base" => tiktoken_rs::o200k_base(),
            "p50k_base" => tiktoken_rs::p50k_base(),
            model => tiktoken_rs::get_bpe_from_model(model),
        }
        .map_err(|e| TokenizerError {
            name: encoding.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            name: encoding.to_string(),
            bpe,
        })
    }
}

#[cfg(feature = "tiktoken")]
impl Tokenizer for TiktokenTokenizer {
    fn name(&self) -> &str {
        &self.name
    }

    fn count(&self, text: &str) -> Result<usize, TokenizerError> {
        Ok(self.bpe.encode_with_special_tokens(text).len())
    }
}

/// Estimates token counts for text and messages.
///
/// Uses the configured tokenizer when one is set and falls back to the
/// character heuristic whenever it errors. Never fails.
#[derive(Clone, Default)]
pub struct TokenEstimator {
    tokenizer: Option<Arc<dyn Tokenizer>>,
}

impl std::fmt::Debug for TokenEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenEstimator")
            .field(
                "tokenizer",
                &self.tokenizer.as_ref().map(|t| t.name().to_string()),
            )
            .finish()
    }
}

impl TokenEstimator {
    /// Estimator that only uses the character heuristic.
    pub fn heuristic() -> Self {
        Self { tokenizer: None }
    }

    /// Estimator backed by a real tokenizer.
    pub fn with_tokenizer(tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self {
            tokenizer: Some(tokenizer),
        }
    }

    /// Estimator for a configured tokenizer name.
    ///
    /// `heuristic` (or blank) needs nothing. Any other name is a BPE encoding
    /// or model id and requires the `tiktoken` feature.
    pub fn from_name(name: &str) -> Result<Self, TokenizerError> {
        match name.trim() {
            "" | HEURISTIC_TOKENIZER => Ok(Self::heuristic()),
            #[cfg(feature = "tiktoken")]
            encoding => Ok(Self::with_tokenizer(Arc::new(TiktokenTokenizer::new(encoding)?))),
            #[cfg(not(feature = "tiktoken"))]
            other => Err(TokenizerError {
                name: other.to_string(),
                message: "built without the `tiktoken` feature".to_string(),
            }),
        }
    }

    /// Name of the tokenizer in use.
    pub fn tokenizer_name(&self) -> &str {
        self.tokenizer
            .as_ref()
            .map_or(HEURISTIC_TOKENIZER, |t| t.name())
    }

    /// Estimate tokens for a text string.
    pub fn estimate(&self, text: &str) -> usize {
        match &self.tokenizer {
            Some(tokenizer) => match tokenizer.count(text) {
                Ok(count) => count,
                Err(e) => {
                    debug!(error = %e, "Tokenizer failed, using heuristic");
                    HeuristicTokenizer::estimate(text)
                }
            },
            None => HeuristicTokenizer::estimate(text),
        }
    }

    /// Estimate tokens for a single message (text parts only).
    pub fn estimate_message(&self, message: &Message) -> usize {
        message
            .content
            .text_segments()
            .map(|text| self.estimate(text))
            .sum()
    }

    /// Estimate total tokens for a list of messages.
    pub fn estimate_messages(&self, messages: &[Message]) -> usize {
        messages.iter().map(|m| self.estimate_message(m)).sum()
    }
}

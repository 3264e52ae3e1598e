//! Configuration for Condenser.
//!
//! Settings are read from `.condenser/condenser.toml`. Every field has a
//! default, so a missing file yields a working configuration.
//!
//! Layering: file → environment → CLI.
//!
//! # Configuration File Format
//!
//! ```toml
//! [compaction]
//! compression_threshold_tokens = 64000
//! hard_cap_tokens = 120000
//! keep_first = 1
//! keep_last = 6
//! tokenizer = "heuristic"    # or "cl100k_base", "o200k_base" (feature `tiktoken`)
//!
//! [compaction.overrides."gpt-4o"]
//! compression_threshold_tokens = 90000
//! hard_cap_tokens = 120000
//!
//! [summarizer]
//! model_id = "gpt-4o-mini"
//! hard_cap_override = 100000
//! max_summary_tokens = 4000
//! temperature = 0.1
//!
//! [llm]
//! base_url = "https://api.openai.com/v1"
//! api_key_env = "OPENAI_API_KEY"
//! timeout_secs = 120
//!
//! [store]
//! path = "summaries.db"
//!
//! [models."my-assistant"]
//! base_model_ids = ["gpt-4o"]
//! system_prompt = "You are a helpful assistant."
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::compaction::{HEURISTIC_TOKENIZER, TokenEstimator};
use crate::errors::TokenizerError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Directory holding the config file and the summary database.
pub const CONDENSER_DIR: &str = ".condenser";

/// Config file name inside [`CONDENSER_DIR`].
pub const CONFIG_FILE: &str = "condenser.toml";

/// Environment variable that overrides the API key regardless of `api_key_env`.
pub const API_KEY_ENV: &str = "CONDENSER_API_KEY";

/// Environment variable that overrides `llm.base_url`.
pub const BASE_URL_ENV: &str = "CONDENSER_BASE_URL";

/// Environment variable that overrides `summarizer.model_id`.
pub const SUMMARIZER_MODEL_ENV: &str = "CONDENSER_SUMMARIZER_MODEL";

/// Get the `.condenser` directory for a project.
pub fn get_condenser_dir(project_dir: &Path) -> PathBuf {
    project_dir.join(CONDENSER_DIR)
}

/// Token thresholds and retention policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactionSection {
    /// Transcript size at which background re-summarization is triggered
    #[serde(default = "default_compression_threshold")]
    pub compression_threshold_tokens: usize,
    /// Maximum size of the view sent to the model
    #[serde(default = "default_hard_cap")]
    pub hard_cap_tokens: usize,
    /// Messages kept verbatim at the start of the transcript
    #[serde(default = "default_keep_first")]
    pub keep_first: usize,
    /// Messages kept verbatim at the end of the transcript
    #[serde(default = "default_keep_last")]
    pub keep_last: usize,
    /// Token counter: `heuristic`, or a BPE encoding / model name
    #[serde(default = "default_tokenizer")]
    pub tokenizer: String,
    /// Per-model threshold overrides, keyed by model id
    #[serde(default)]
    pub overrides: BTreeMap<String, ThresholdOverride>,
}

fn default_compression_threshold() -> usize {
    64_000
}

fn default_hard_cap() -> usize {
    120_000
}

fn default_keep_first() -> usize {
    1
}

fn default_keep_last() -> usize {
    6
}

fn default_tokenizer() -> String {
    HEURISTIC_TOKENIZER.to_string()
}

impl Default for CompactionSection {
    fn default() -> Self {
        Self {
            compression_threshold_tokens: default_compression_threshold(),
            hard_cap_tokens: default_hard_cap(),
            keep_first: default_keep_first(),
            keep_last: default_keep_last(),
            tokenizer: default_tokenizer(),
            overrides: BTreeMap::new(),
        }
    }
}

/// Threshold override for one model. Unset fields use the global default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression_threshold_tokens: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hard_cap_tokens: Option<usize>,
}

/// Settings for the background summarizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizerSection {
    /// Model used for summarization (defaults to the conversation's model)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    /// Hard cap for the summarizer's own input, overriding its thresholds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hard_cap_override: Option<usize>,
    /// Upper bound on the generated summary length
    #[serde(default = "default_max_summary_tokens")]
    pub max_summary_tokens: usize,
    /// Sampling temperature for the summary call
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_max_summary_tokens() -> usize {
    4_000
}

fn default_temperature() -> f32 {
    0.1
}

impl Default for SummarizerSection {
    fn default() -> Self {
        Self {
            model_id: None,
            hard_cap_override: None,
            max_summary_tokens: default_max_summary_tokens(),
            temperature: default_temperature(),
        }
    }
}

/// OpenAI-compatible completion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSection {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Name of the environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Summary database location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSection {
    /// Path to the SQLite file, relative to `.condenser/` unless absolute
    #[serde(default = "default_store_path")]
    pub path: String,
}

fn default_store_path() -> String {
    "summaries.db".to_string()
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

/// Externally declared model metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelEntry {
    /// Models this one is derived from; their threshold overrides apply
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub base_model_ids: Vec<String>,
    /// System prompt configured on the model rather than in the transcript
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

/// The complete condenser.toml configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CondenserToml {
    #[serde(default)]
    pub compaction: CompactionSection,
    #[serde(default)]
    pub summarizer: SummarizerSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub models: BTreeMap<String, ModelEntry>,
}

impl CondenserToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse condenser.toml")
    }

    /// Load configuration from `.condenser/condenser.toml`.
    /// Returns default configuration if the file doesn't exist.
    pub fn load_or_default(condenser_dir: &Path) -> Result<Self> {
        let config_path = condenser_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize condenser.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Summarizer model id (env → file).
    pub fn summarizer_model(&self) -> Option<String> {
        std::env::var(SUMMARIZER_MODEL_ENV)
            .ok()
            .filter(|m| !m.trim().is_empty())
            .or_else(|| self.summarizer.model_id.clone())
            .filter(|m| !m.trim().is_empty())
    }

    /// Completion endpoint base URL (env → file).
    pub fn base_url(&self) -> String {
        std::env::var(BASE_URL_ENV).unwrap_or_else(|_| self.llm.base_url.clone())
    }

    /// API key from `CONDENSER_API_KEY`, then the configured env var.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(API_KEY_ENV)
            .ok()
            .or_else(|| std::env::var(&self.llm.api_key_env).ok())
            .filter(|k| !k.is_empty())
    }

    /// Resolve the store path against the `.condenser` directory.
    pub fn store_path(&self, condenser_dir: &Path) -> PathBuf {
        let path = PathBuf::from(&self.store.path);
        if path.is_absolute() {
            path
        } else {
            condenser_dir.join(path)
        }
    }

    /// Runtime settings for the engine.
    pub fn compaction_settings(&self) -> CompactionSettings {
        CompactionSettings {
            keep_first: self.compaction.keep_first,
            keep_last: self.compaction.keep_last,
            summarizer_model_id: self.summarizer_model(),
            summarizer_hard_cap_override: self.summarizer.hard_cap_override,
            max_summary_tokens: self.summarizer.max_summary_tokens,
            summary_temperature: self.summarizer.temperature,
        }
    }

    /// Estimator for `compaction.tokenizer`.
    pub fn token_estimator(&self) -> Result<TokenEstimator, TokenizerError> {
        TokenEstimator::from_name(&self.compaction.tokenizer)
    }

    /// Model metadata lookup table.
    pub fn model_catalog(&self) -> ModelCatalog {
        ModelCatalog::new(self.models.clone())
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let c = &self.compaction;

        if c.compression_threshold_tokens > c.hard_cap_tokens {
            warnings.push(format!(
                "compression_threshold_tokens ({}) exceeds hard_cap_tokens ({}): views will be trimmed before a summary is ever generated",
                c.compression_threshold_tokens, c.hard_cap_tokens
            ));
        }

        if c.hard_cap_tokens == 0 {
            warnings.push("hard_cap_tokens is 0: every view will be reduced to one message".into());
        }

        if let Err(e) = self.token_estimator() {
            warnings.push(format!("{}: falling back to the character heuristic", e));
        }

        if c.keep_last == 0 {
            warnings.push(
                "keep_last is 0: the most recent turn may be summarized away".to_string(),
            );
        }

        for (model, o) in &c.overrides {
            let threshold = o
                .compression_threshold_tokens
                .unwrap_or(c.compression_threshold_tokens);
            let cap = o.hard_cap_tokens.unwrap_or(c.hard_cap_tokens);
            if threshold > cap {
                warnings.push(format!(
                    "Override for '{}': compression threshold ({}) exceeds hard cap ({})",
                    model, threshold, cap
                ));
            }
        }

        let s = &self.summarizer;
        if s.max_summary_tokens == 0 {
            warnings.push("max_summary_tokens is 0: summaries will be empty".to_string());
        }

        if !(0.0..=2.0).contains(&s.temperature) {
            warnings.push(format!(
                "summarizer temperature {} is outside 0.0-2.0",
                s.temperature
            ));
        }

        if let Some(cap) = s.hard_cap_override
            && cap <= s.max_summary_tokens
        {
            warnings.push(format!(
                "summarizer hard_cap_override ({}) leaves no room for input after reserving {} output tokens",
                cap, s.max_summary_tokens
            ));
        }

        for (model, entry) in &self.models {
            if entry.base_model_ids.iter().any(|b| b == model) {
                warnings.push(format!("Model '{}' lists itself as a base model", model));
            }
        }

        warnings
    }
}

/// Resolved runtime settings for compaction and summarization.
#[derive(Debug, Clone, PartialEq)]
pub struct CompactionSettings {
    pub keep_first: usize,
    pub keep_last: usize,
    pub summarizer_model_id: Option<String>,
    pub summarizer_hard_cap_override: Option<usize>,
    pub max_summary_tokens: usize,
    pub summary_temperature: f32,
}

impl Default for CompactionSettings {
    fn default() -> Self {
        CondenserToml::default().compaction_settings()
    }
}

/// Lookup for externally declared model metadata.
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    models: BTreeMap<String, ModelEntry>,
}

impl ModelCatalog {
    pub fn new(models: BTreeMap<String, ModelEntry>) -> Self {
        Self { models }
    }

    /// Declared base-model ids for a model, in declaration order.
    pub fn base_model_ids(&self, model_id: &str) -> &[String] {
        self.models
            .get(model_id)
            .map(|m| m.base_model_ids.as_slice())
            .unwrap_or(&[])
    }

    /// System prompt configured on the model, if any.
    pub fn system_prompt(&self, model_id: &str) -> Option<&str> {
        self.models
            .get(model_id)
            .and_then(|m| m.system_prompt.as_deref())
            .filter(|p| !p.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = CondenserToml::default();
        assert_eq!(config.compaction.compression_threshold_tokens, 64_000);
        assert_eq!(config.compaction.hard_cap_tokens, 120_000);
        assert_eq!(config.compaction.keep_first, 1);
        assert_eq!(config.compaction.keep_last, 6);
        assert_eq!(config.summarizer.max_summary_tokens, 4_000);
        assert!((config.summarizer.temperature - 0.1).abs() < f32::EPSILON);
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let content = r#"
[compaction]
compression_threshold_tokens = 5000
hard_cap_tokens = 8000
keep_first = 2
keep_last = 4

[compaction.overrides."gpt-4o"]
hard_cap_tokens = 100000

[summarizer]
model_id = "gpt-4o-mini"
hard_cap_override = 30000
max_summary_tokens = 1000
temperature = 0.2

[llm]
base_url = "http://localhost:8080/v1"
api_key_env = "LOCAL_KEY"

[store]
path = "/var/lib/condenser/summaries.db"

[models."helper"]
base_model_ids = ["gpt-4o"]
system_prompt = "Be terse."
"#;
        let config = CondenserToml::parse(content).unwrap();
        assert_eq!(config.compaction.keep_first, 2);
        assert_eq!(
            config.compaction.overrides["gpt-4o"].hard_cap_tokens,
            Some(100_000)
        );
        assert_eq!(config.compaction.overrides["gpt-4o"].compression_threshold_tokens, None);
        assert_eq!(config.summarizer.model_id.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(config.llm.base_url, "http://localhost:8080/v1");
        assert_eq!(config.llm.timeout_secs, 120);

        let catalog = config.model_catalog();
        assert_eq!(catalog.base_model_ids("helper"), ["gpt-4o".to_string()]);
        assert_eq!(catalog.system_prompt("helper"), Some("Be terse."));
        assert!(catalog.base_model_ids("unknown").is_empty());

        assert_eq!(
            config.store_path(Path::new("/tmp/x")),
            PathBuf::from("/var/lib/condenser/summaries.db")
        );
    }

    #[test]
    fn test_tokenizer_selection() {
        let config = CondenserToml::default();
        assert_eq!(config.compaction.tokenizer, "heuristic");
        assert!(config.token_estimator().is_ok());

        let config = CondenserToml::parse("[compaction]\ntokenizer = \"no-such-encoding\"\n").unwrap();
        assert!(config.token_estimator().is_err());
        assert!(
            config
                .validate()
                .iter()
                .any(|w| w.contains("no-such-encoding"))
        );
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = CondenserToml::parse("[compaction]\nkeep_last = 10\n").unwrap();
        assert_eq!(config.compaction.keep_last, 10);
        assert_eq!(config.compaction.keep_first, 1);
        assert_eq!(config.compaction.hard_cap_tokens, 120_000);
        assert_eq!(config.llm.api_key_env, "OPENAI_API_KEY");
    }

    #[test]
    fn test_invalid_toml_is_error() {
        assert!(CondenserToml::parse("[compaction\nkeep_last = ").is_err());
        assert!(CondenserToml::parse("[compaction]\nkeep_last = \"six\"").is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempdir().unwrap();
        let config = CondenserToml::load_or_default(dir.path()).unwrap();
        assert_eq!(config.compaction.keep_last, 6);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);

        let mut config = CondenserToml::default();
        config.compaction.keep_first = 3;
        config.compaction.overrides.insert(
            "gpt-4o".into(),
            ThresholdOverride {
                compression_threshold_tokens: Some(1_000),
                hard_cap_tokens: None,
            },
        );
        config.save(&path).unwrap();

        let loaded = CondenserToml::load_or_default(dir.path()).unwrap();
        assert_eq!(loaded.compaction.keep_first, 3);
        assert_eq!(
            loaded.compaction.overrides["gpt-4o"].compression_threshold_tokens,
            Some(1_000)
        );
    }

    #[test]
    fn test_store_path_relative_to_condenser_dir() {
        let config = CondenserToml::default();
        assert_eq!(
            config.store_path(Path::new("/proj/.condenser")),
            PathBuf::from("/proj/.condenser/summaries.db")
        );
    }

    #[test]
    fn test_validate_threshold_above_cap() {
        let mut config = CondenserToml::default();
        config.compaction.compression_threshold_tokens = 10_000;
        config.compaction.hard_cap_tokens = 5_000;
        let warnings = config.validate();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("exceeds hard_cap_tokens"));
    }

    #[test]
    fn test_validate_override_and_summarizer() {
        let mut config = CondenserToml::default();
        config.compaction.overrides.insert(
            "small".into(),
            ThresholdOverride {
                compression_threshold_tokens: None,
                hard_cap_tokens: Some(1_000),
            },
        );
        config.summarizer.temperature = 3.5;
        config.summarizer.hard_cap_override = Some(2_000);
        config.compaction.keep_last = 0;

        let warnings = config.validate();
        assert!(warnings.iter().any(|w| w.contains("Override for 'small'")));
        assert!(warnings.iter().any(|w| w.contains("temperature")));
        assert!(warnings.iter().any(|w| w.contains("hard_cap_override")));
        assert!(warnings.iter().any(|w| w.contains("keep_last is 0")));
    }

    #[test]
    fn test_validate_self_referencing_model() {
        let mut config = CondenserToml::default();
        config.models.insert(
            "loop".into(),
            ModelEntry {
                base_model_ids: vec!["loop".into()],
                system_prompt: None,
            },
        );
        assert!(config.validate().iter().any(|w| w.contains("itself")));
    }

    #[test]
    fn test_blank_system_prompt_is_ignored() {
        let mut models = BTreeMap::new();
        models.insert(
            "m".to_string(),
            ModelEntry {
                base_model_ids: Vec::new(),
                system_prompt: Some("   ".into()),
            },
        );
        let catalog = ModelCatalog::new(models);
        assert_eq!(catalog.system_prompt("m"), None);
    }

    #[test]
    fn test_compaction_settings_from_config() {
        let mut config = CondenserToml::default();
        config.summarizer.hard_cap_override = Some(50_000);
        config.summarizer.max_summary_tokens = 2_000;
        let settings = config.compaction_settings();
        assert_eq!(settings.keep_first, 1);
        assert_eq!(settings.keep_last, 6);
        assert_eq!(settings.summarizer_hard_cap_override, Some(50_000));
        assert_eq!(settings.max_summary_tokens, 2_000);
    }
}

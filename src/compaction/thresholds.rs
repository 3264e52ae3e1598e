//! Per-model compression thresholds and hard caps.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};

use tracing::debug;

use crate::config::{CondenserToml, ModelCatalog, ThresholdOverride};

/// Resolved token limits for one model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    /// Transcript size that triggers background re-summarization.
    pub compression_threshold: usize,
    /// Maximum size of the view sent to the model.
    pub hard_cap: usize,
}

/// Where a resolution came from. Reported for diagnostics only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThresholdSource {
    Exact,
    BaseModel(String),
    Default,
}

/// Resolves thresholds for a model id and caches the result per instance.
///
/// Order: cache → exact override → override of a declared base model →
/// global defaults.
#[derive(Debug)]
pub struct ThresholdResolver {
    defaults: Thresholds,
    overrides: BTreeMap<String, ThresholdOverride>,
    catalog: ModelCatalog,
    cache: Mutex<HashMap<String, Thresholds>>,
}

impl ThresholdResolver {
    pub fn new(
        defaults: Thresholds,
        overrides: BTreeMap<String, ThresholdOverride>,
        catalog: ModelCatalog,
    ) -> Self {
        Self {
            defaults,
            overrides,
            catalog,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &CondenserToml) -> Self {
        Self::new(
            Thresholds {
                compression_threshold: config.compaction.compression_threshold_tokens,
                hard_cap: config.compaction.hard_cap_tokens,
            },
            config.compaction.overrides.clone(),
            config.model_catalog(),
        )
    }

    pub fn defaults(&self) -> Thresholds {
        self.defaults
    }

    /// Resolve thresholds for `model_id`, using the cache when possible.
    pub fn resolve(&self, model_id: &str) -> Thresholds {
        // A poisoned cache only means another caller panicked mid-insert;
        // the map itself is still a valid cache.
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(cached) = cache.get(model_id) {
            return *cached;
        }

        let (thresholds, source) = self.lookup(model_id);
        debug!(model = model_id, ?source, ?thresholds, "Resolved thresholds");
        cache.insert(model_id.to_string(), thresholds);
        thresholds
    }

    /// Resolve without touching the cache.
    pub fn lookup(&self, model_id: &str) -> (Thresholds, ThresholdSource) {
        if let Some(o) = self.overrides.get(model_id) {
            return (self.apply(o), ThresholdSource::Exact);
        }

        for base in self.catalog.base_model_ids(model_id) {
            if let Some(o) = self.overrides.get(base) {
                return (self.apply(o), ThresholdSource::BaseModel(base.clone()));
            }
        }

        (self.defaults, ThresholdSource::Default)
    }

    /// Number of cached model ids.
    pub fn cached_len(&self) -> usize {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn apply(&self, o: &ThresholdOverride) -> Thresholds {
        Thresholds {
            compression_threshold: o
                .compression_threshold_tokens
                .unwrap_or(self.defaults.compression_threshold),
            hard_cap: o.hard_cap_tokens.unwrap_or(self.defaults.hard_cap),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelEntry;

    fn resolver() -> ThresholdResolver {
        let mut overrides = BTreeMap::new();
        overrides.insert(
            "gpt-4o".to_string(),
            ThresholdOverride {
                compression_threshold_tokens: Some(90_000),
                hard_cap_tokens: Some(110_000),
            },
        );
        overrides.insert(
            "small".to_string(),
            ThresholdOverride {
                compression_threshold_tokens: None,
                hard_cap_tokens: Some(8_000),
            },
        );
        overrides.insert(
            "derived-with-own".to_string(),
            ThresholdOverride {
                compression_threshold_tokens: Some(1_000),
                hard_cap_tokens: Some(2_000),
            },
        );

        let mut models = BTreeMap::new();
        models.insert(
            "assistant".to_string(),
            ModelEntry {
                base_model_ids: vec!["unlisted".into(), "gpt-4o".into(), "small".into()],
                system_prompt: None,
            },
        );
        models.insert(
            "derived-with-own".to_string(),
            ModelEntry {
                base_model_ids: vec!["gpt-4o".into()],
                system_prompt: None,
            },
        );

        ThresholdResolver::new(
            Thresholds {
                compression_threshold: 64_000,
                hard_cap: 120_000,
            },
            overrides,
            ModelCatalog::new(models),
        )
    }

    #[test]
    fn test_exact_override() {
        let r = resolver();
        assert_eq!(
            r.resolve("gpt-4o"),
            Thresholds {
                compression_threshold: 90_000,
                hard_cap: 110_000
            }
        );
        assert_eq!(r.lookup("gpt-4o").1, ThresholdSource::Exact);
    }

    #[test]
    fn test_partial_override_fills_from_defaults() {
        let r = resolver();
        assert_eq!(
            r.resolve("small"),
            Thresholds {
                compression_threshold: 64_000,
                hard_cap: 8_000
            }
        );
    }

    #[test]
    fn test_base_model_fallback_in_declaration_order() {
        let r = resolver();
        let (thresholds, source) = r.lookup("assistant");
        assert_eq!(source, ThresholdSource::BaseModel("gpt-4o".into()));
        assert_eq!(thresholds.hard_cap, 110_000);
    }

    #[test]
    fn test_exact_override_beats_base_model() {
        let r = resolver();
        assert_eq!(r.resolve("derived-with-own").hard_cap, 2_000);
    }

    #[test]
    fn test_unknown_model_uses_defaults() {
        let r = resolver();
        let (thresholds, source) = r.lookup("mystery");
        assert_eq!(source, ThresholdSource::Default);
        assert_eq!(thresholds, r.defaults());
    }

    #[test]
    fn test_results_are_cached_per_instance() {
        let r = resolver();
        assert_eq!(r.cached_len(), 0);
        r.resolve("gpt-4o");
        r.resolve("gpt-4o");
        r.resolve("mystery");
        assert_eq!(r.cached_len(), 2);

        // A separate instance has its own cache.
        let other = resolver();
        assert_eq!(other.cached_len(), 0);
    }

    #[test]
    fn test_from_config() {
        let config = CondenserToml::parse(
            r#"
[compaction]
compression_threshold_tokens = 100
hard_cap_tokens = 200

[compaction.overrides."m"]
hard_cap_tokens = 50
"#,
        )
        .unwrap();
        let r = ThresholdResolver::from_config(&config);
        assert_eq!(r.resolve("m").hard_cap, 50);
        assert_eq!(r.resolve("m").compression_threshold, 100);
        assert_eq!(r.resolve("other").hard_cap, 200);
    }
}

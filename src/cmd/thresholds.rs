//! Threshold inspection (`condenser thresholds <model>`).

use anyhow::Result;

use super::setup::load_config;

pub fn cmd_thresholds(project_dir: &std::path::Path, model: &str) -> Result<()> {
    use condenser::compaction::{ThresholdResolver, ThresholdSource};

    let config = load_config(project_dir)?;
    let resolver = ThresholdResolver::from_config(&config);
    let (thresholds, source) = resolver.lookup(model);

    let source = match source {
        ThresholdSource::Exact => "model override".to_string(),
        ThresholdSource::BaseModel(base) => format!("base model '{}'", base),
        ThresholdSource::Default => "defaults".to_string(),
    };

    println!("Model: {}", model);
    println!(
        "  compression_threshold = {} tokens",
        thresholds.compression_threshold
    );
    println!("  hard_cap = {} tokens", thresholds.hard_cap);
    println!("  source = {}", source);

    Ok(())
}

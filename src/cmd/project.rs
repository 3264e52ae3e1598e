//! Project initialization (`condenser init`).

use anyhow::{Context, Result};

use super::setup::{load_config, open_store};

pub fn cmd_init(project_dir: &std::path::Path) -> Result<()> {
    use condenser::config::{CONFIG_FILE, CondenserToml, get_condenser_dir};

    let condenser_dir = get_condenser_dir(project_dir);
    let config_path = condenser_dir.join(CONFIG_FILE);
    let was_initialized = config_path.exists();

    std::fs::create_dir_all(&condenser_dir).with_context(|| {
        format!("Failed to create directory: {}", condenser_dir.display())
    })?;

    if !was_initialized {
        CondenserToml::default().save(&config_path)?;
    }

    let config = load_config(project_dir)?;
    open_store(project_dir, &config)?;
    let store_path = config.store_path(&condenser_dir);

    if was_initialized {
        println!(
            "Condenser project already initialized at {}",
            condenser_dir.display()
        );
        println!("Summary store verified: {}", store_path.display());
    } else {
        println!("Initialized condenser at {}", condenser_dir.display());
        println!();
        println!("Created:");
        println!("  .condenser/");
        println!("  ├── condenser.toml   # Thresholds, summarizer and endpoint settings");
        println!("  └── {:<16} # Rolling conversation summaries", config.store.path);
        println!();
        println!("Next steps:");
        println!("  1. Set the summarizer model with `[summarizer] model_id`");
        println!("  2. Export your API key ({} or CONDENSER_API_KEY)", config.llm.api_key_env);
        println!("  3. Try `condenser view --transcript chat.json --model <id>`");
    }

    Ok(())
}

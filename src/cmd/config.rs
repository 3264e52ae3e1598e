//! Configuration view and validation commands (`condenser config`).

use anyhow::Result;

use super::super::ConfigCommands;

pub fn cmd_config(project_dir: &std::path::Path, command: Option<ConfigCommands>) -> Result<()> {
    use condenser::config::{CONFIG_FILE, CondenserToml, get_condenser_dir};

    let condenser_dir = get_condenser_dir(project_dir);
    let config_path = condenser_dir.join(CONFIG_FILE);

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Condenser Configuration");
            println!("=======================");
            println!();

            let toml = if config_path.exists() {
                println!("Config file: {}", config_path.display());
                CondenserToml::load(&config_path)?
            } else {
                println!("No condenser.toml found at {}", config_path.display());
                println!("Using default configuration.");
                CondenserToml::default()
            };
            println!();

            println!("[compaction]");
            println!(
                "  compression_threshold_tokens = {}",
                toml.compaction.compression_threshold_tokens
            );
            println!("  hard_cap_tokens = {}", toml.compaction.hard_cap_tokens);
            println!("  keep_first = {}", toml.compaction.keep_first);
            println!("  keep_last = {}", toml.compaction.keep_last);
            println!();

            if !toml.compaction.overrides.is_empty() {
                println!("[compaction.overrides]");
                for (model, o) in &toml.compaction.overrides {
                    println!("  \"{}\":", model);
                    if let Some(t) = o.compression_threshold_tokens {
                        println!("    compression_threshold_tokens = {}", t);
                    }
                    if let Some(cap) = o.hard_cap_tokens {
                        println!("    hard_cap_tokens = {}", cap);
                    }
                }
                println!();
            }

            println!("[summarizer]");
            if let Some(model) = &toml.summarizer.model_id {
                println!("  model_id = \"{}\"", model);
            }
            if let Some(cap) = toml.summarizer.hard_cap_override {
                println!("  hard_cap_override = {}", cap);
            }
            println!(
                "  max_summary_tokens = {}",
                toml.summarizer.max_summary_tokens
            );
            println!("  temperature = {}", toml.summarizer.temperature);
            println!();

            println!("[llm]");
            println!("  base_url = \"{}\"", toml.llm.base_url);
            println!("  api_key_env = \"{}\"", toml.llm.api_key_env);
            println!("  timeout_secs = {}", toml.llm.timeout_secs);
            println!();

            println!("[store]");
            println!("  path = \"{}\"", toml.store.path);
            println!();

            if !toml.models.is_empty() {
                println!("[models]");
                for (model, entry) in &toml.models {
                    println!("  \"{}\":", model);
                    if !entry.base_model_ids.is_empty() {
                        println!("    base_model_ids = {:?}", entry.base_model_ids);
                    }
                    if entry.system_prompt.is_some() {
                        println!("    system_prompt = (set)");
                    }
                }
                println!();
            }

            println!("Effective values (with env overrides):");
            println!(
                "  summarizer model = {}",
                toml.summarizer_model()
                    .unwrap_or_else(|| "(request model)".to_string())
            );
            println!("  base_url = \"{}\"", toml.base_url());
            println!(
                "  api key = {}",
                if toml.api_key().is_some() {
                    "set"
                } else {
                    "not set"
                }
            );
            println!(
                "  store = {}",
                toml.store_path(&condenser_dir).display()
            );
            println!();

            if !config_path.exists() {
                println!("Run 'condenser config init' to create a condenser.toml file.");
                println!();
            }
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No condenser.toml found. Using defaults (valid).");
                return Ok(());
            }

            let toml = CondenserToml::load(&config_path)?;
            let warnings = toml.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("condenser.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            if !condenser_dir.exists() {
                std::fs::create_dir_all(&condenser_dir)?;
            }

            CondenserToml::default().save(&config_path)?;

            println!("Created condenser.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [compaction] thresholds, keep_first, keep_last");
            println!("  - [compaction.overrides.\"model-id\"] for per-model limits");
            println!("  - [summarizer] model_id, max_summary_tokens, temperature");
            println!("  - [llm] base_url, api_key_env, timeout_secs");
            println!();
        }
    }

    Ok(())
}

//! Stored summary inspection (`condenser summary show`).

use anyhow::Result;

use super::setup::{load_config, open_store};

pub async fn cmd_summary_show(project_dir: &std::path::Path, conversation: &str) -> Result<()> {
    use condenser::store::SummaryStore;

    let config = load_config(project_dir)?;
    let store = open_store(project_dir, &config)?;

    match store.load(conversation).await? {
        Some(summary) => {
            println!("Conversation: {}", summary.conversation_id);
            println!("Compacted through: message {}", summary.compacted_through);
            println!("Created: {}", summary.created_at.to_rfc3339());
            println!("Updated: {}", summary.updated_at.to_rfc3339());
            println!();
            println!("{}", summary.summary_text);
        }
        None => {
            println!("No summary stored for conversation {}", conversation);
        }
    }

    Ok(())
}

//! Config loading, engine wiring and transcript files for CLI commands.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;

use condenser::CompactionEngine;
use condenser::compaction::Message;
use condenser::config::{CondenserToml, get_condenser_dir};
use condenser::llm::HttpCompletionClient;
use condenser::store::SqliteSummaryStore;

/// Load `.condenser/condenser.toml`, falling back to defaults.
pub fn load_config(project_dir: &Path) -> Result<CondenserToml> {
    CondenserToml::load_or_default(&get_condenser_dir(project_dir))
}

/// Open the configured SQLite summary store.
pub fn open_store(project_dir: &Path, config: &CondenserToml) -> Result<SqliteSummaryStore> {
    let path = config.store_path(&get_condenser_dir(project_dir));
    SqliteSummaryStore::open(&path)
        .with_context(|| format!("Failed to open summary store at {}", path.display()))
}

/// Build an engine backed by the project's store and the configured endpoint.
pub fn build_engine(project_dir: &Path) -> Result<CompactionEngine> {
    let config = load_config(project_dir)?;
    let store = open_store(project_dir, &config)?;
    let llm = HttpCompletionClient::from_config(&config)?;

    CompactionEngine::builder(&config)
        .store(Arc::new(store))
        .llm(Arc::new(llm))
        .build()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TranscriptFile {
    Messages(Vec<Message>),
    Request { messages: Vec<Message> },
}

/// Read a transcript from a JSON file holding either a message array or a
/// request object with a `messages` field.
pub fn read_transcript(path: &Path) -> Result<Vec<Message>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read transcript: {}", path.display()))?;
    let file: TranscriptFile = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse transcript: {}", path.display()))?;
    Ok(match file {
        TranscriptFile::Messages(messages) => messages,
        TranscriptFile::Request { messages } => messages,
    })
}

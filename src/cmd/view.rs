//! Inlet preview (`condenser view`).

use anyhow::{Context, Result};
use serde_json::json;

use super::setup::{build_engine, read_transcript};

pub async fn cmd_view(
    project_dir: &std::path::Path,
    transcript: &std::path::Path,
    model: &str,
    conversation: Option<&str>,
) -> Result<()> {
    use condenser::request::ChatRequest;

    let messages = read_transcript(transcript)?;
    let engine = build_engine(project_dir)?;

    let mut request = ChatRequest::new(model, messages);
    if let Some(id) = conversation {
        request = request.with_chat_id(id);
    }

    let outcome = engine.inlet(request, None).await;
    let output = json!({
        "messages": outcome.request.messages,
        "stats": outcome.stats,
    });

    println!(
        "{}",
        serde_json::to_string_pretty(&output).context("Failed to serialize view")?
    );

    Ok(())
}

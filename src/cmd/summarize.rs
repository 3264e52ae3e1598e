//! Outlet run (`condenser summarize`).

use anyhow::{Result, bail};

use super::setup::{build_engine, read_transcript};

pub async fn cmd_summarize(
    project_dir: &std::path::Path,
    transcript: &std::path::Path,
    model: &str,
    conversation: &str,
    owner: Option<&str>,
) -> Result<()> {
    use condenser::compaction::SummaryOutcome;
    use condenser::request::ChatRequest;

    let messages = read_transcript(transcript)?;
    let engine = build_engine(project_dir)?;

    let mut request = ChatRequest::new(model, messages).with_chat_id(conversation);
    if let Some(owner) = owner {
        request = request.with_user_id(owner);
    }

    let Some(task) = engine.outlet(&request, None) else {
        bail!("Conversation id is empty");
    };

    let outcome = task.join().await;
    println!("Conversation {}: {}", conversation, outcome);

    if let SummaryOutcome::Failed(e) = outcome {
        bail!("Summarization failed: {}", e);
    }

    Ok(())
}

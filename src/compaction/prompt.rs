//! Prompt construction for the summarizer model.

use super::message::Message;

/// Instructions sent as the system message of every summarization call.
pub fn summary_instruction(max_summary_tokens: usize) -> String {
    format!(
        "You compress chat transcripts into a running summary that replaces the \
original messages in future requests.

Rules:
- Preserve verbatim: code, shell commands, file paths, identifiers, parameter \
values, numbers, URLs and error messages.
- Keep every decision, constraint, open question and unresolved task.
- Record who asked for what, and what was agreed.
- Drop greetings, filler and repeated content.
- Write dense, structured prose with short headings or bullet lists.
- If an earlier summary is provided, merge it with the new messages into one \
summary. Do not mention that a summary was merged.
- Stay under {} tokens. Output only the summary.",
        max_summary_tokens
    )
}

/// Flatten messages into `Label: text` blocks separated by blank lines.
/// Messages without text are skipped.
pub fn format_transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .filter_map(|m| {
            let text = m.text();
            let text = text.trim();
            (!text.is_empty()).then(|| format!("{}: {}", m.role.label(), text))
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Build the messages for one summarization call.
pub fn build_summary_messages(
    middle: &[Message],
    previous_summary: Option<&str>,
    max_summary_tokens: usize,
) -> Vec<Message> {
    let mut body = String::new();
    if let Some(previous) = previous_summary {
        body.push_str("Earlier summary:\n");
        body.push_str(previous.trim());
        body.push_str("\n\nNew messages:\n");
    }
    body.push_str(&format_transcript(middle));

    vec![
        Message::system(summary_instruction(max_summary_tokens)),
        Message::user(body),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compaction::message::{ContentPart, Role};
    use serde_json::json;

    #[test]
    fn test_format_transcript_labels_roles() {
        let messages = vec![
            Message::system("Be helpful."),
            Message::user("How do I list files?"),
            Message::assistant("Run `ls -la`."),
        ];
        assert_eq!(
            format_transcript(&messages),
            "System: Be helpful.\n\nUser: How do I list files?\n\nAssistant: Run `ls -la`."
        );
    }

    #[test]
    fn test_format_transcript_skips_non_text() {
        let messages = vec![
            Message::with_parts(
                Role::User,
                vec![ContentPart::Other(json!({"type": "image_url"}))],
            ),
            Message::assistant("  A cat.  "),
        ];
        assert_eq!(format_transcript(&messages), "Assistant: A cat.");
    }

    #[test]
    fn test_instruction_mentions_budget() {
        assert!(summary_instruction(4000).contains("4000 tokens"));
    }

    #[test]
    fn test_build_summary_messages_without_previous() {
        let messages = build_summary_messages(&[Message::user("hi")], None, 100);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].text(), "User: hi");
    }

    #[test]
    fn test_build_summary_messages_with_previous() {
        let messages = build_summary_messages(&[Message::assistant("done")], Some("old facts\n"), 100);
        assert_eq!(
            messages[1].text(),
            "Earlier summary:\nold facts\n\nNew messages:\nAssistant: done"
        );
    }
}

//! Structure-aware trimming of long messages.
//!
//! Keeps Markdown headings plus the first and last content lines, and
//! collapses everything in between into marker lines.

use regex::Regex;
use std::sync::LazyLock;

use super::message::{Content, ContentPart, Message};

/// Messages at or below this many characters are never trimmed.
pub const MIN_TRIM_CHARS: usize = 200;

/// A trim that keeps more than this share of the original text failed.
pub const MAX_RETAINED_RATIO: f64 = 0.8;

/// Replaces each collapsed run of lines.
pub const COLLAPSE_MARKER: &str = "[...]";

static HEADING_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ {0,3}#{1,6}\s").unwrap());

fn is_fence(line: &str) -> bool {
    let t = line.trim_start();
    t.starts_with("```") || t.starts_with("~~~")
}

/// Collapse a block of text, keeping headings and the first and last
/// content lines. Blank lines are dropped.
pub fn collapse_text(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();

    let mut in_fence = false;
    let mut is_heading = vec![false; lines.len()];
    for (i, line) in lines.iter().enumerate() {
        if is_fence(line) {
            in_fence = !in_fence;
            continue;
        }
        if !in_fence && HEADING_REGEX.is_match(line) {
            is_heading[i] = true;
        }
    }

    let mut content = (0..lines.len()).filter(|&i| !is_heading[i] && !lines[i].trim().is_empty());
    let first = content.next();
    let last = content.last().or(first);

    let mut out: Vec<&str> = Vec::new();
    let mut collapsing = false;
    for (i, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        if is_heading[i] || Some(i) == first || Some(i) == last {
            out.push(line);
            collapsing = false;
        } else if !collapsing {
            out.push(COLLAPSE_MARKER);
            collapsing = true;
        }
    }

    out.join("\n")
}

/// Trim a message's text content.
///
/// Returns `None` when the result would keep more than
/// [`MAX_RETAINED_RATIO`] of the original characters. Non-text parts are
/// carried over untouched.
pub fn trim_message(message: &Message) -> Option<Content> {
    let original = message.text_len();
    if original == 0 {
        return None;
    }

    let trimmed = match &message.content {
        Content::Text(text) => Content::Text(collapse_text(text)),
        Content::Parts(parts) => Content::Parts(
            parts
                .iter()
                .map(|part| match part {
                    ContentPart::Text { text, extra } => ContentPart::Text {
                        text: collapse_text(text),
                        extra: extra.clone(),
                    },
                    other => other.clone(),
                })
                .collect(),
        ),
    };

    let retained: usize = trimmed.text_segments().map(|s| s.chars().count()).sum();
    if retained as f64 > original as f64 * MAX_RETAINED_RATIO {
        return None;
    }
    Some(trimmed)
}

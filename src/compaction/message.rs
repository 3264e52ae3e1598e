//! Chat message model shared by the inlet and the outlet.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// Label used when flattening a transcript into plain text.
    pub fn label(self) -> &'static str {
        match self {
            Role::System => "System",
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// One element of a multimodal message.
///
/// Only `Text` parts take part in token accounting, trimming and
/// summarization. Everything else (image references, audio, files) is kept
/// verbatim as raw JSON so it round-trips to the model untouched. Sibling
/// keys of a text part (`cache_control`, ...) are kept in `extra`.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentPart {
    Text {
        text: String,
        extra: Map<String, Value>,
    },
    Other(Value),
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text {
            text: text.into(),
            extra: Map::new(),
        }
    }
}

impl Serialize for ContentPart {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ContentPart::Text { text, extra } => {
                let mut object = extra.clone();
                object.insert("type".into(), Value::from("text"));
                object.insert("text".into(), Value::from(text.as_str()));
                object.serialize(serializer)
            }
            ContentPart::Other(value) => value.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for ContentPart {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        match value {
            Value::Object(mut object)
                if object.get("type").and_then(Value::as_str) == Some("text")
                    && object.get("text").is_some_and(Value::is_string) =>
            {
                let text = match object.remove("text") {
                    Some(Value::String(text)) => text,
                    _ => String::new(),
                };
                object.remove("type");
                Ok(ContentPart::Text {
                    text,
                    extra: object,
                })
            }
            other => Ok(ContentPart::Other(other)),
        }
    }
}

/// Message body: plain text or an ordered list of typed parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl Default for Content {
    fn default() -> Self {
        Content::Text(String::new())
    }
}

impl Content {
    /// Iterate over the text segments of this content.
    pub fn text_segments(&self) -> Box<dyn Iterator<Item = &str> + '_> {
        match self {
            Content::Text(text) => Box::new(std::iter::once(text.as_str())),
            Content::Parts(parts) => Box::new(parts.iter().filter_map(|p| match p {
                ContentPart::Text { text, .. } => Some(text.as_str()),
                ContentPart::Other(_) => None,
            })),
        }
    }
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub content: Content,
    /// Set once structure-aware trimming has collapsed this message.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub trimmed: bool,
    /// Other message keys (`name`, `id`, `tool_calls`, ...), written back unchanged.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Message {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: Content::Text(text.into()),
            trimmed: false,
            extra: Map::new(),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    /// Build a multi-part message.
    pub fn with_parts(role: Role, parts: Vec<ContentPart>) -> Self {
        Self {
            role,
            content: Content::Parts(parts),
            trimmed: false,
            extra: Map::new(),
        }
    }

    /// All text parts joined with newlines.
    pub fn text(&self) -> String {
        self.content.text_segments().collect::<Vec<_>>().join("\n")
    }

    /// Length of the text content in characters.
    pub fn text_len(&self) -> usize {
        self.content.text_segments().map(|s| s.chars().count()).sum()
    }

    pub fn is_system(&self) -> bool {
        self.role == Role::System
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_labels() {
        assert_eq!(Role::System.label(), "System");
        assert_eq!(Role::User.label(), "User");
        assert_eq!(Role::Assistant.label(), "Assistant");
        assert_eq!(Role::Assistant.to_string(), "assistant");
    }

    #[test]
    fn test_deserialize_plain_text_message() {
        let msg: Message = serde_json::from_str(r#"{"role":"user","content":"hello"}"#).unwrap();
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.text(), "hello");
        assert!(!msg.trimmed);
    }

    #[test]
    fn test_deserialize_multimodal_message_keeps_other_parts() {
        let raw = r#"{
            "role": "user",
            "content": [
                {"type": "text", "text": "what is this?"},
                {"type": "image_url", "image_url": {"url": "data:image/png;base64,AAA"}},
                {"type": "text", "text": "be brief"}
            ]
        }"#;
        let msg: Message = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.text(), "what is this?\nbe brief");
        assert_eq!(msg.text_len(), "what is this?".len() + "be brief".len());

        match &msg.content {
            Content::Parts(parts) => {
                assert_eq!(parts.len(), 3);
                assert!(matches!(parts[1], ContentPart::Other(_)));
            }
            _ => panic!("Expected Parts content"),
        }

        let back = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            back["content"][1]["image_url"]["url"],
            "data:image/png;base64,AAA"
        );
        assert_eq!(back["content"][0]["type"], "text");
    }

    #[test]
    fn test_trimmed_flag_only_serialized_when_set() {
        let mut msg = Message::assistant("done");
        let json = serde_json::to_value(&msg).unwrap();
        assert!(json.get("trimmed").is_none());

        msg.trimmed = true;
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["trimmed"], true);
    }

    #[test]
    fn test_missing_content_defaults_to_empty_text() {
        let msg: Message = serde_json::from_str(r#"{"role":"assistant"}"#).unwrap();
        assert_eq!(msg.text(), "");
        assert_eq!(msg.text_len(), 0);
    }

    #[test]
    fn test_unknown_message_and_part_keys_round_trip() {
        let raw = r#"{
            "role": "user",
            "name": "ada",
            "id": "msg-7",
            "content": [
                {"type": "text", "text": "hi", "cache_control": {"type": "ephemeral"}}
            ]
        }"#;
        let msg: Message = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.text(), "hi");
        assert_eq!(msg.extra["name"], "ada");

        let back = serde_json::to_value(&msg).unwrap();
        assert_eq!(back["name"], "ada");
        assert_eq!(back["id"], "msg-7");
        assert_eq!(back["content"][0]["text"], "hi");
        assert_eq!(back["content"][0]["type"], "text");
        assert_eq!(back["content"][0]["cache_control"]["type"], "ephemeral");
    }

    #[test]
    fn test_text_len_counts_chars_not_bytes() {
        let msg = Message::user("héllo");
        assert_eq!(msg.text_len(), 5);
    }
}

//! Inbound chat request payloads and id extraction.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::compaction::Message;

/// Conversation-scoped ids a host may attach to a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Other host keys (`session_id`, `features`, ...), written back unchanged.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An OpenAI-style chat request as seen by the inlet and outlet.
///
/// Unknown fields (`stream`, `temperature`, tool definitions, ...) are kept in
/// `extra` and written back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<RequestMetadata>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            chat_id: None,
            message_id: None,
            user_id: None,
            metadata: None,
            extra: Map::new(),
        }
    }

    pub fn with_chat_id(mut self, chat_id: impl Into<String>) -> Self {
        self.chat_id = Some(chat_id.into());
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

/// Ids for one turn of a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnIds {
    pub conversation_id: String,
    pub turn_id: Option<String>,
    pub owner_id: Option<String>,
}

fn non_blank(value: Option<&String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty()).cloned()
}

fn pick(
    explicit: Option<&String>,
    metadata: Option<&String>,
    external: Option<&String>,
) -> Option<String> {
    non_blank(explicit)
        .or_else(|| non_blank(metadata))
        .or_else(|| non_blank(external))
}

impl TurnIds {
    /// Extract ids with precedence: explicit field, then request metadata,
    /// then host-supplied `external` metadata.
    ///
    /// Returns `None` when no conversation id is available.
    pub fn resolve(request: &ChatRequest, external: Option<&RequestMetadata>) -> Option<Self> {
        let metadata = request.metadata.as_ref();
        let conversation_id = pick(
            request.chat_id.as_ref(),
            metadata.and_then(|m| m.chat_id.as_ref()),
            external.and_then(|m| m.chat_id.as_ref()),
        )?;

        Some(Self {
            conversation_id,
            turn_id: pick(
                request.message_id.as_ref(),
                metadata.and_then(|m| m.message_id.as_ref()),
                external.and_then(|m| m.message_id.as_ref()),
            ),
            owner_id: pick(
                request.user_id.as_ref(),
                metadata.and_then(|m| m.user_id.as_ref()),
                external.and_then(|m| m.user_id.as_ref()),
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(chat: Option<&str>, msg: Option<&str>, user: Option<&str>) -> RequestMetadata {
        RequestMetadata {
            chat_id: chat.map(String::from),
            message_id: msg.map(String::from),
            user_id: user.map(String::from),
            ..RequestMetadata::default()
        }
    }

    #[test]
    fn test_explicit_field_wins() {
        let mut request = ChatRequest::new("m", vec![]).with_chat_id("explicit");
        request.metadata = Some(meta(Some("meta"), None, None));
        let external = meta(Some("external"), None, None);

        let ids = TurnIds::resolve(&request, Some(&external)).unwrap();
        assert_eq!(ids.conversation_id, "explicit");
    }

    #[test]
    fn test_metadata_beats_external() {
        let mut request = ChatRequest::new("m", vec![]);
        request.metadata = Some(meta(Some("meta"), Some("turn-1"), None));
        let external = meta(Some("external"), Some("turn-2"), Some("owner"));

        let ids = TurnIds::resolve(&request, Some(&external)).unwrap();
        assert_eq!(ids.conversation_id, "meta");
        assert_eq!(ids.turn_id.as_deref(), Some("turn-1"));
        assert_eq!(ids.owner_id.as_deref(), Some("owner"));
    }

    #[test]
    fn test_external_fallback() {
        let request = ChatRequest::new("m", vec![]);
        let external = meta(Some("external"), None, None);
        let ids = TurnIds::resolve(&request, Some(&external)).unwrap();
        assert_eq!(ids.conversation_id, "external");
        assert!(ids.owner_id.is_none());
    }

    #[test]
    fn test_missing_or_blank_conversation_id() {
        let request = ChatRequest::new("m", vec![]);
        assert!(TurnIds::resolve(&request, None).is_none());

        let blank = ChatRequest::new("m", vec![]).with_chat_id("  ");
        assert!(TurnIds::resolve(&blank, None).is_none());
    }

    #[test]
    fn test_unknown_fields_round_trip() {
        let raw = r#"{
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": "hi"}],
            "stream": true,
            "temperature": 0.3,
            "metadata": {"chat_id": "c1", "user_id": "u1"}
        }"#;
        let request: ChatRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(request.extra["stream"], true);

        let ids = TurnIds::resolve(&request, None).unwrap();
        assert_eq!(ids.conversation_id, "c1");
        assert_eq!(ids.owner_id.as_deref(), Some("u1"));

        let back = serde_json::to_value(&request).unwrap();
        assert_eq!(back["temperature"], 0.3);
        assert_eq!(back["metadata"]["chat_id"], "c1");
        assert!(back.get("chat_id").is_none());
    }

    #[test]
    fn test_unknown_metadata_keys_round_trip() {
        let raw = r#"{
            "model": "m",
            "messages": [],
            "metadata": {"chat_id": "c1", "session_id": "s-9", "features": {"web_search": true}}
        }"#;
        let request: ChatRequest = serde_json::from_str(raw).unwrap();
        let back = serde_json::to_value(&request).unwrap();
        assert_eq!(back["metadata"]["chat_id"], "c1");
        assert_eq!(back["metadata"]["session_id"], "s-9");
        assert_eq!(back["metadata"]["features"]["web_search"], true);
    }
}

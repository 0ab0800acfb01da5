//! Wire envelope encoding and decoding.
//!
//! Every frame is a JSON object carrying a discriminator field (configurable,
//! `"action"` by default) and an optional `payload`:
//!
//! ```text
//! {"action": "chat.message", "payload": {"text": "hi"}}
//! {"action": "error", "payload": [{"type": "missing", "loc": ["payload", "text"], "msg": "Field required"}]}
//! {"action": "complete"}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::message::Message;
use super::validation::{ErrorEntry, PathSegment};

/// Default discriminator field name.
pub const DEFAULT_DISCRIMINATOR_FIELD: &str = "action";

/// Discriminator value of error envelopes.
pub const ERROR_ACTION: &str = "error";

/// Discriminator value of the authentication status frame.
pub const AUTHENTICATION_ACTION: &str = "authentication";

/// Key holding the kind-specific body.
pub const PAYLOAD_FIELD: &str = "payload";

/// Discriminator values the protocol itself emits. Message kinds may not use them.
pub const RESERVED_ACTIONS: [&str; 5] = [
    ERROR_ACTION,
    AUTHENTICATION_ACTION,
    "complete",
    "group_complete",
    "event_complete",
];

/// True for discriminator values owned by the protocol.
pub fn is_reserved_action(action: &str) -> bool {
    RESERVED_ACTIONS.contains(&action)
}

/// Which processing cycle a completion sentinel closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionKind {
    /// An inbound frame was handled and replied to directly.
    DirectReply,
    /// A group broadcast was issued or delivered.
    GroupBroadcast,
    /// An event handler ran.
    Event,
}

impl CompletionKind {
    /// Discriminator value of the sentinel.
    pub fn action(&self) -> &'static str {
        match self {
            CompletionKind::DirectReply => "complete",
            CompletionKind::GroupBroadcast => "group_complete",
            CompletionKind::Event => "event_complete",
        }
    }
}

/// One decoded or outgoing frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub action: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
}

impl Envelope {
    pub fn new(action: impl Into<String>, payload: Value) -> Self {
        Self {
            action: action.into(),
            payload,
        }
    }

    /// Envelope for a typed message.
    pub fn from_message<M: Message>(message: &M) -> Result<Self, serde_json::Error> {
        Ok(Self::new(M::ACTION, serde_json::to_value(message)?))
    }

    /// Error envelope listing every problem.
    pub fn error(entries: Vec<ErrorEntry>) -> Self {
        let payload = entries
            .into_iter()
            .map(|entry| serde_json::to_value(entry).unwrap_or(Value::Null))
            .collect();
        Self::new(ERROR_ACTION, Value::Array(payload))
    }

    /// Completion sentinel; carries no payload.
    pub fn completion(kind: CompletionKind) -> Self {
        Self::new(kind.action(), Value::Null)
    }

    /// Authentication status frame.
    pub fn authentication(status_code: u16, status_text: &str) -> Self {
        Self::new(
            AUTHENTICATION_ACTION,
            serde_json::json!({ "status_code": status_code, "status_text": status_text }),
        )
    }

    /// Decodes the payload into `M`.
    pub fn payload_as<M: Message>(&self) -> Result<M, serde_json::Error> {
        M::deserialize(&self.payload)
    }

    /// True if this envelope carries `M`'s discriminator.
    pub fn is<M: Message>(&self) -> bool {
        self.action == M::ACTION
    }

    /// Wire representation using `field` as the discriminator key.
    pub fn to_wire(&self, field: &str) -> Value {
        let mut map = Map::new();
        map.insert(field.to_string(), Value::String(self.action.clone()));
        if !self.payload.is_null() {
            map.insert(PAYLOAD_FIELD.to_string(), self.payload.clone());
        }
        Value::Object(map)
    }

    /// Serialized wire text.
    pub fn encode(&self, field: &str) -> String {
        self.to_wire(field).to_string()
    }
}

/// Per-frame failures. All of them are recoverable: the client receives an
/// error envelope and the connection stays open.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Bytes were not a JSON document.
    #[error("Malformed frame: {0}")]
    Decode(String),

    /// The envelope or its payload did not match the schema.
    #[error("Envelope failed validation with {} problem(s)", .0.len())]
    Validation(Vec<ErrorEntry>),

    /// No handler is registered for the discriminator.
    #[error("Unknown action '{action}'")]
    UnknownAction { field: String, action: String },
}

impl FrameError {
    /// Client-visible error entries.
    pub fn entries(&self) -> Vec<ErrorEntry> {
        match self {
            FrameError::Decode(reason) => vec![ErrorEntry::new(
                "json_invalid",
                Vec::new(),
                format!("Invalid JSON: {}", reason),
            )],
            FrameError::Validation(entries) => entries.clone(),
            FrameError::UnknownAction { field, action } => vec![ErrorEntry::new(
                "unknown_action",
                vec![PathSegment::Key(field.clone())],
                format!("Unknown action '{}'", action),
            )],
        }
    }

    /// Short machine-readable kind for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            FrameError::Decode(_) => "decode",
            FrameError::Validation(_) => "validation",
            FrameError::UnknownAction { .. } => "unknown_action",
        }
    }
}

/// Envelope split into discriminator and payload, payload not yet validated.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEnvelope {
    pub action: String,
    /// `None` when the `payload` key is absent.
    pub payload: Option<Value>,
}

impl RawEnvelope {
    /// Parses wire text and resolves the discriminator.
    pub fn parse(text: &str, field: &str) -> Result<Self, FrameError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| FrameError::Decode(e.to_string()))?;
        Self::from_value(value, field)
    }

    /// Resolves the discriminator of an already-parsed document.
    pub fn from_value(value: Value, field: &str) -> Result<Self, FrameError> {
        let Value::Object(mut map) = value else {
            return Err(FrameError::Validation(vec![ErrorEntry::new(
                "model_type",
                Vec::new(),
                "Input should be a valid dictionary or object",
            )]));
        };

        let action = match map.remove(field) {
            Some(Value::String(action)) => action,
            Some(_) => {
                return Err(FrameError::Validation(vec![ErrorEntry::new(
                    "string_type",
                    vec![PathSegment::Key(field.to_string())],
                    "Discriminator should be a valid string",
                )]))
            }
            None => {
                return Err(FrameError::Validation(vec![ErrorEntry::new(
                    "missing",
                    vec![PathSegment::Key(field.to_string())],
                    "Field required",
                )]))
            }
        };

        Ok(Self {
            action,
            payload: map.remove(PAYLOAD_FIELD),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payloadless_envelope_omits_payload_key() {
        let envelope = Envelope::new("pong", Value::Null);
        assert_eq!(envelope.encode("action"), r#"{"action":"pong"}"#);
    }

    #[test]
    fn custom_discriminator_field_is_used() {
        let envelope = Envelope::new("pong", json!({"n": 1}));
        assert_eq!(envelope.to_wire("type"), json!({"type": "pong", "payload": {"n": 1}}));
    }

    #[test]
    fn completion_sentinels_use_distinct_actions() {
        assert_eq!(Envelope::completion(CompletionKind::DirectReply).action, "complete");
        assert_eq!(Envelope::completion(CompletionKind::GroupBroadcast).action, "group_complete");
        assert_eq!(Envelope::completion(CompletionKind::Event).action, "event_complete");
    }

    #[test]
    fn error_envelope_lists_entries() {
        let envelope = Envelope::error(vec![ErrorEntry::new(
            "missing",
            vec![PathSegment::from("payload"), PathSegment::from("text")],
            "Field required",
        )]);
        assert_eq!(
            envelope.to_wire("action"),
            json!({
                "action": "error",
                "payload": [{"type": "missing", "loc": ["payload", "text"], "msg": "Field required"}]
            })
        );
    }

    #[test]
    fn parse_splits_action_and_payload() {
        let raw = RawEnvelope::parse(r#"{"action":"say","payload":{"text":"hi"}}"#, "action").unwrap();
        assert_eq!(raw.action, "say");
        assert_eq!(raw.payload, Some(json!({"text": "hi"})));
    }

    #[test]
    fn parse_without_payload_yields_none() {
        let raw = RawEnvelope::parse(r#"{"action":"ping"}"#, "action").unwrap();
        assert_eq!(raw.payload, None);
    }

    #[test]
    fn parse_rejects_malformed_json() {
        let err = RawEnvelope::parse("{not json", "action").unwrap_err();
        assert!(matches!(err, FrameError::Decode(_)));
        assert_eq!(err.entries()[0].kind, "json_invalid");
    }

    #[test]
    fn parse_reports_missing_discriminator() {
        let err = RawEnvelope::parse(r#"{"payload":{}}"#, "action").unwrap_err();
        let entries = err.entries();
        assert_eq!(entries[0].kind, "missing");
        assert_eq!(entries[0].loc, vec![PathSegment::from("action")]);
    }

    #[test]
    fn parse_reports_non_string_discriminator() {
        let err = RawEnvelope::parse(r#"{"action":7}"#, "action").unwrap_err();
        assert_eq!(err.entries()[0].kind, "string_type");
    }

    #[test]
    fn parse_rejects_non_object_document() {
        let err = RawEnvelope::parse("[1,2]", "action").unwrap_err();
        assert_eq!(err.entries()[0].kind, "model_type");
    }

    #[test]
    fn unknown_action_entry_points_at_discriminator() {
        let err = FrameError::UnknownAction {
            field: "action".to_string(),
            action: "bogus".to_string(),
        };
        let entries = err.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, "unknown_action");
        assert_eq!(entries[0].loc, vec![PathSegment::from("action")]);
    }

    #[test]
    fn envelope_serde_roundtrip_for_channel_transport() {
        let envelope = Envelope::new("chat", json!({"text": "hi"}));
        let text = serde_json::to_string(&envelope).unwrap();
        let back: Envelope = serde_json::from_str(&text).unwrap();
        assert_eq!(back, envelope);

        let bare: Envelope = serde_json::from_str(r#"{"action":"ping"}"#).unwrap();
        assert_eq!(bare.payload, Value::Null);
    }
}

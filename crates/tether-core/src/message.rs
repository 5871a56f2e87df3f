//! Decoded application messages

use bytes::Bytes;
use serde_json::{json, Value};
use std::fmt;

use crate::decode::to_hex;

/// A binary payload that could not be classified as JSON or text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryPayload {
    /// Lowercase hex, two characters per byte
    pub hex: String,
    /// The original bytes (shares the frame's buffer)
    pub raw: Bytes,
}

impl BinaryPayload {
    pub fn new(raw: Bytes) -> Self {
        Self {
            hex: to_hex(&raw),
            raw,
        }
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}

/// One inbound message after decoding
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Json(Value),
    Text(String),
    Binary(BinaryPayload),
}

impl Message {
    /// Short label for the variant
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Json(_) => "json",
            Message::Text(_) => "text",
            Message::Binary(_) => "binary",
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Message::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Message::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Routing key: the `topic` field, else the `channel` field
    ///
    /// Only non-empty string values count. Anything else (missing field,
    /// number, object, non-JSON message) yields `None`.
    pub fn topic(&self) -> Option<&str> {
        let value = self.as_json()?;
        ["topic", "channel"]
            .iter()
            .filter_map(|field| value.get(field).and_then(Value::as_str))
            .find(|topic| !topic.is_empty())
    }

    /// Server ping value, at top level or nested under `data`
    pub fn ping(&self) -> Option<&Value> {
        let value = self.as_json()?;
        value
            .get("ping")
            .or_else(|| value.get("data").filter(|d| d.is_object())?.get("ping"))
    }

    /// Structured view used for rendering and logging
    pub fn to_value(&self) -> Value {
        match self {
            Message::Json(value) => value.clone(),
            Message::Text(text) => json!({ "type": "text", "content": text }),
            Message::Binary(binary) => json!({
                "type": "binary",
                "hex": binary.hex,
                "byteLength": binary.len(),
            }),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Json(value) => write!(f, "{}", value),
            Message::Text(text) => write!(f, "{}", text),
            Message::Binary(binary) => write!(f, "<{} bytes> {}", binary.len(), binary.hex),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_prefers_topic_over_channel() {
        let msg = Message::Json(json!({"topic": "quotes", "channel": "other"}));
        assert_eq!(msg.topic(), Some("quotes"));

        let msg = Message::Json(json!({"channel": "trades"}));
        assert_eq!(msg.topic(), Some("trades"));

        let msg = Message::Json(json!({"topic": "", "channel": "trades"}));
        assert_eq!(msg.topic(), Some("trades"));
    }

    #[test]
    fn test_non_string_topic_is_missing() {
        assert_eq!(Message::Json(json!({"topic": 7})).topic(), None);
        assert_eq!(Message::Text("topic".into()).topic(), None);
    }

    #[test]
    fn test_ping_top_level_and_nested() {
        assert_eq!(Message::Json(json!({"ping": 42})).ping(), Some(&json!(42)));
        assert_eq!(
            Message::Json(json!({"data": {"ping": "abc"}})).ping(),
            Some(&json!("abc"))
        );
        assert_eq!(Message::Json(json!({"data": "ping"})).ping(), None);
        assert_eq!(Message::Json(json!({"pong": 1})).ping(), None);
    }

    #[test]
    fn test_binary_payload_hex() {
        let payload = BinaryPayload::new(Bytes::from_static(&[0xde, 0xad, 0x01]));
        assert_eq!(payload.hex, "dead01");
        assert_eq!(payload.len(), 3);
    }
}

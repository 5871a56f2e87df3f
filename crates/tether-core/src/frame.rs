//! Wire frames and outbound payloads
//!
//! A [`Frame`] is one discrete unit delivered by or handed to the transport.
//! Host byte types are converted into [`Bytes`] once, at the transport
//! boundary, and never inspected again by anything but the decoder.

use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;

/// A single transport frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
}

impl Frame {
    /// Payload length in bytes
    pub fn len(&self) -> usize {
        match self {
            Frame::Text(text) => text.len(),
            Frame::Binary(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Frame::Text(_))
    }
}

/// Something the caller wants to put on the wire
///
/// Text passes through untouched, JSON values are serialized to a text
/// frame, bytes go out as a binary frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(String),
    Json(Value),
    Bytes(Bytes),
}

impl Payload {
    /// Serialize any `Serialize` value into a JSON payload
    pub fn json<T: Serialize>(value: &T) -> crate::Result<Self> {
        Ok(Payload::Json(serde_json::to_value(value)?))
    }

    /// Whether the payload carries nothing worth sending
    ///
    /// Empty text, empty bytes and JSON `null` count as empty.
    pub fn is_empty(&self) -> bool {
        match self {
            Payload::Text(text) => text.is_empty(),
            Payload::Json(value) => value.is_null(),
            Payload::Bytes(data) => data.is_empty(),
        }
    }

    /// Convert to the frame that goes on the wire
    pub fn to_frame(&self) -> Frame {
        match self {
            Payload::Text(text) => Frame::Text(text.clone()),
            Payload::Json(value) => Frame::Text(value.to_string()),
            Payload::Bytes(data) => Frame::Binary(data.clone()),
        }
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Json(value)
    }
}

impl From<Bytes> for Payload {
    fn from(data: Bytes) -> Self {
        Payload::Bytes(data)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(data: Vec<u8>) -> Self {
        Payload::Bytes(Bytes::from(data))
    }
}

impl From<Payload> for Frame {
    fn from(payload: Payload) -> Self {
        match payload {
            Payload::Text(text) => Frame::Text(text),
            Payload::Json(value) => Frame::Text(value.to_string()),
            Payload::Bytes(data) => Frame::Binary(data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_payload_becomes_text_frame() {
        let frame = Payload::from(json!({"action": "get_data"})).to_frame();
        assert_eq!(frame, Frame::Text(r#"{"action":"get_data"}"#.to_string()));
    }

    #[test]
    fn test_bytes_payload_stays_binary() {
        let frame: Frame = Payload::from(vec![0u8, 1, 2]).into();
        assert_eq!(frame, Frame::Binary(Bytes::from_static(&[0, 1, 2])));
    }

    #[test]
    fn test_empty_payloads() {
        assert!(Payload::from("").is_empty());
        assert!(Payload::Json(Value::Null).is_empty());
        assert!(Payload::from(Vec::new()).is_empty());
        assert!(!Payload::from(json!({})).is_empty());
        assert!(!Payload::from("x").is_empty());
    }
}

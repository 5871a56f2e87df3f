//! Payload decoding
//!
//! Turns opaque byte buffers into [`Message`]s without knowing the schema up
//! front. The `auto` policy tries JSON first, then UTF-8 text, then falls back
//! to a hex descriptor of the raw bytes:
//!
//! ```text
//! bytes ──► utf8 ──► json parse ──► Message::Json
//!             │          └─ fail ──► non-empty? ──► Message::Text
//!             └─ fail ─────────────────────────────► Message::Binary { hex, raw }
//! ```
//!
//! JSON-shaped payloads are a subset of UTF-8 text, so trying JSON first
//! gives them the more specific classification.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::inflate::Inflate;
use crate::message::{BinaryPayload, Message};
use crate::{Error, Result};

/// A decoder: bytes in, message out, `None` when the payload doesn't fit
pub type DecoderFn = Arc<dyn Fn(&Bytes) -> Option<Message> + Send + Sync>;

/// Decoder selection as it appears in configuration
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DecoderKind {
    #[default]
    Auto,
    Utf8,
    Json,
    Hex,
    Binary,
    /// 4-byte little-endian type id, then a body for that type's decoder
    Typed,
    /// A decoder registered at runtime under this name
    Custom(String),
}

impl DecoderKind {
    pub fn name(&self) -> &str {
        match self {
            DecoderKind::Auto => "auto",
            DecoderKind::Utf8 => "utf8",
            DecoderKind::Json => "json",
            DecoderKind::Hex => "hex",
            DecoderKind::Binary => "binary",
            DecoderKind::Typed => "typed",
            DecoderKind::Custom(name) => name,
        }
    }
}

impl From<&str> for DecoderKind {
    fn from(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "auto" => DecoderKind::Auto,
            "utf8" | "utf-8" | "text" => DecoderKind::Utf8,
            "json" => DecoderKind::Json,
            "hex" => DecoderKind::Hex,
            "binary" | "raw" => DecoderKind::Binary,
            "typed" => DecoderKind::Typed,
            _ => DecoderKind::Custom(name.to_string()),
        }
    }
}

impl From<String> for DecoderKind {
    fn from(name: String) -> Self {
        DecoderKind::from(name.as_str())
    }
}

impl From<DecoderKind> for String {
    fn from(kind: DecoderKind) -> Self {
        kind.name().to_string()
    }
}

impl FromStr for DecoderKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(DecoderKind::from(s))
    }
}

impl fmt::Display for DecoderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Lowercase hex, two characters per byte, no separators
pub fn to_hex(data: &[u8]) -> String {
    hex::encode(data)
}

/// Parse a hex string produced by [`to_hex`] (either case accepted)
pub fn from_hex(text: &str) -> Result<Vec<u8>> {
    hex::decode(text).map_err(|e| match e {
        hex::FromHexError::InvalidHexCharacter { index, .. } => Error::InvalidHex { offset: index },
        hex::FromHexError::OddLength | hex::FromHexError::InvalidStringLength => {
            Error::InvalidHex { offset: text.len() }
        }
    })
}

/// Strict UTF-8 decode
pub fn decode_utf8(data: &[u8]) -> Result<String> {
    Ok(std::str::from_utf8(data)?.to_string())
}

/// UTF-8 decode followed by a JSON parse
pub fn decode_json(data: &[u8]) -> Result<Value> {
    let text = std::str::from_utf8(data)?;
    Ok(serde_json::from_str(text)?)
}

/// The `auto` policy; never fails
pub fn decode_auto(data: &Bytes) -> Message {
    if let Ok(value) = decode_json(data) {
        return Message::Json(value);
    }

    match decode_utf8(data) {
        Ok(text) if !text.is_empty() => Message::Text(text),
        _ => Message::Binary(BinaryPayload::new(data.clone())),
    }
}

/// Inflate, then JSON, then text
///
/// A buffer that doesn't inflate comes back as a binary descriptor of the
/// original bytes instead of an error, so a malformed frame can never take
/// the connection down.
pub fn decode_compressed(data: &Bytes, inflater: &dyn Inflate) -> Message {
    let inflated = match inflater.inflate(data) {
        Ok(inflated) => inflated,
        Err(e) => {
            warn!("Inflate failed for {} byte frame: {}", data.len(), e);
            return Message::Binary(BinaryPayload::new(data.clone()));
        }
    };

    match decode_json(&inflated) {
        Ok(value) => Message::Json(value),
        Err(e) => {
            debug!("Inflated payload is not JSON ({}), trying text", e);
            match String::from_utf8(inflated) {
                Ok(text) => Message::Text(text),
                Err(e) => Message::Binary(BinaryPayload::new(Bytes::from(e.into_bytes()))),
            }
        }
    }
}

/// Text frames: JSON if it parses, the raw string otherwise
pub fn decode_text_frame(text: &str) -> Message {
    match serde_json::from_str(text) {
        Ok(value) => Message::Json(value),
        Err(e) => {
            debug!("Text frame is not JSON ({}), keeping as text", e);
            Message::Text(text.to_string())
        }
    }
}

/// Named decoders, extensible at runtime
#[derive(Clone)]
pub struct DecoderRegistry {
    decoders: HashMap<String, DecoderFn>,
    message_types: HashMap<u32, String>,
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DecoderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.decoders.keys().collect();
        names.sort();
        f.debug_struct("DecoderRegistry")
            .field("decoders", &names)
            .field("message_types", &self.message_types.len())
            .finish()
    }
}

impl DecoderRegistry {
    /// Registry with the `utf8`, `json`, `hex` and `binary` decoders
    pub fn new() -> Self {
        let mut registry = Self {
            decoders: HashMap::new(),
            message_types: HashMap::new(),
        };

        registry.register("utf8", |data| decode_utf8(data).ok().map(Message::Text));
        registry.register("json", |data| decode_json(data).ok().map(Message::Json));
        registry.register("hex", |data| Some(Message::Text(to_hex(data))));
        registry.register("binary", |data| {
            Some(Message::Binary(BinaryPayload::new(data.clone())))
        });

        registry
    }

    /// Register (or replace) a decoder
    ///
    /// `auto` and `typed` are resolved before the lookup and cannot be
    /// replaced.
    pub fn register<F>(&mut self, name: impl Into<String>, decoder: F)
    where
        F: Fn(&Bytes) -> Option<Message> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!("Registered decoder '{}'", name);
        self.decoders.insert(name, Arc::new(decoder));
    }

    /// Register a message type for the `typed` decoder
    ///
    /// Frames whose first four bytes read `type_id` (little-endian) have the
    /// rest of the frame decoded by `decoder`, which is also reachable on
    /// its own under `name`.
    pub fn register_message_type<F>(&mut self, type_id: u32, name: impl Into<String>, decoder: F)
    where
        F: Fn(&Bytes) -> Option<Message> + Send + Sync + 'static,
    {
        let name = name.into();
        self.register(name.clone(), decoder);
        if let Some(old) = self.message_types.insert(type_id, name) {
            debug!("Message type {} was '{}', replaced", type_id, old);
        }
    }

    /// Name registered for a message type id
    pub fn message_type(&self, type_id: u32) -> Option<&str> {
        self.message_types.get(&type_id).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        matches!(name, "auto" | "typed") || self.decoders.contains_key(name)
    }

    /// Decode with the named decoder, `None` on failure or unknown name
    pub fn decode(&self, data: &Bytes, name: &str) -> Option<Message> {
        match self.try_decode(data, name) {
            Ok(message) => Some(message),
            Err(e) => {
                debug!("{}", e);
                None
            }
        }
    }

    pub fn decode_with(&self, data: &Bytes, kind: &DecoderKind) -> Option<Message> {
        self.decode(data, kind.name())
    }

    /// Like [`decode`](Self::decode), but says why it failed
    pub fn try_decode(&self, data: &Bytes, name: &str) -> Result<Message> {
        match name {
            "auto" => return Ok(decode_auto(data)),
            "typed" => return self.decode_typed(data),
            _ => {}
        }

        let decoder = self
            .decoders
            .get(name)
            .ok_or_else(|| Error::UnknownDecoder(name.to_string()))?;

        decoder(data).ok_or_else(|| Error::Rejected {
            decoder: name.to_string(),
            len: data.len(),
        })
    }
}

impl DecoderRegistry {
    /// Split off the type id header and decode the body by its type
    pub fn decode_typed(&self, data: &Bytes) -> Result<Message> {
        if data.len() < TYPE_ID_LEN {
            return Err(Error::FrameTooShort {
                len: data.len(),
                need: TYPE_ID_LEN,
            });
        }

        let type_id = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let name = self
            .message_type(type_id)
            .ok_or(Error::UnknownMessageType(type_id))?;
        self.try_decode(&data.slice(TYPE_ID_LEN..), name)
    }
}

/// Bytes of type id in front of a typed frame
pub const TYPE_ID_LEN: usize = 4;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hex_lowercase_no_separators() {
        assert_eq!(to_hex(&[0x00, 0x0f, 0xab, 0xff]), "000fabff");
        assert_eq!(to_hex(&[]), "");
    }

    #[test]
    fn test_from_hex_rejects_bad_input() {
        assert!(matches!(from_hex("abc"), Err(Error::InvalidHex { offset: 3 })));
        assert!(matches!(from_hex("zz"), Err(Error::InvalidHex { offset: 0 })));
        assert_eq!(from_hex("DEADbeef").unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn test_decoder_kind_parsing() {
        assert_eq!("AUTO".parse::<DecoderKind>().unwrap(), DecoderKind::Auto);
        assert_eq!(DecoderKind::from("utf-8"), DecoderKind::Utf8);
        assert_eq!(
            DecoderKind::from("protobuf"),
            DecoderKind::Custom("protobuf".into())
        );
        assert_eq!(DecoderKind::Hex.to_string(), "hex");
        assert_eq!(DecoderKind::from("typed"), DecoderKind::Typed);
    }

    #[test]
    fn test_decoder_kind_serde() {
        let kind: DecoderKind = serde_json::from_value(json!("json")).unwrap();
        assert_eq!(kind, DecoderKind::Json);
        assert_eq!(serde_json::to_value(DecoderKind::Binary).unwrap(), json!("binary"));
    }

    #[test]
    fn test_text_frame_fallback() {
        assert_eq!(decode_text_frame(r#"{"a":1}"#), Message::Json(json!({"a": 1})));
        assert_eq!(decode_text_frame("hi there"), Message::Text("hi there".into()));
    }

    #[test]
    fn test_unknown_decoder() {
        let registry = DecoderRegistry::new();
        let err = registry.try_decode(&Bytes::from_static(b"x"), "nope").unwrap_err();
        assert!(matches!(err, Error::UnknownDecoder(_)));
        assert!(registry.decode(&Bytes::from_static(b"x"), "nope").is_none());
    }
}

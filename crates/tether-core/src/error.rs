//! Error types for Tether

use thiserror::Error;

/// Result type alias for Tether core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Tether core error types
#[derive(Error, Debug)]
pub enum Error {
    /// Payload is not valid UTF-8
    #[error("invalid utf-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// Payload is not valid JSON
    #[error("invalid json: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// Hex string has odd length or a non-hex digit
    #[error("invalid hex at offset {offset}")]
    InvalidHex { offset: usize },

    /// Inflate step failed
    #[error("inflate failed: {0}")]
    Inflate(String),

    /// No decoder registered under this name
    #[error("unknown decoder: {0}")]
    UnknownDecoder(String),

    /// Typed frame shorter than its header
    #[error("frame of {len} bytes is too short, need at least {need}")]
    FrameTooShort { len: usize, need: usize },

    /// Typed frame carries an id nobody registered
    #[error("unknown message type id {0}")]
    UnknownMessageType(u32),

    /// Decoder ran but produced nothing for this payload
    #[error("decoder '{decoder}' rejected {len} byte payload")]
    Rejected { decoder: String, len: usize },
}

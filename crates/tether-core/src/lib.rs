//! Tether Core
//!
//! Wire-level building blocks for the Tether WebSocket client.
//!
//! This crate provides:
//! - Transport frames and outbound payloads ([`Frame`], [`Payload`])
//! - Decoded application messages ([`Message`])
//! - Client control messages ([`Control`])
//! - The payload decoding pipeline ([`decode`], [`DecoderRegistry`])
//! - Binary format sniffing ([`sniff`])
//! - The inflate capability for compressed frames ([`Inflate`])

pub mod control;
pub mod decode;
pub mod error;
pub mod frame;
pub mod inflate;
pub mod message;
pub mod sniff;
pub mod time;

pub use control::Control;
pub use decode::{
    decode_auto, decode_compressed, decode_text_frame, from_hex, to_hex, DecoderKind,
    DecoderRegistry,
};
pub use error::{Error, Result};
pub use frame::{Frame, Payload};
pub use inflate::{Inflate, ZlibInflater};
pub use message::{BinaryPayload, Message};
pub use sniff::{detect_formats, inspect, Format, Inspection};

/// Close code for a normal, intentional shutdown
pub const CLOSE_NORMAL: u16 = 1000;

/// Close code used when the connection dropped without a close frame
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Minimum interval accepted for scheduled sends, in milliseconds
pub const MIN_TASK_INTERVAL_MS: u64 = 1000;

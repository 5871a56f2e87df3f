//! Tether Transport Layer
//!
//! This crate defines the transport seam the Tether client drives:
//! - [`Transport`] opens one physical connection per call
//! - [`TransportSender`] / [`TransportReceiver`] are the two halves of it
//! - [`TransportEvent`] is the single inbound event stream
//!
//! The WebSocket implementation (feature `websocket`, on by default) wraps
//! tokio-tungstenite.

pub mod error;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use error::{Result, TransportError};
pub use traits::{Transport, TransportEvent, TransportReceiver, TransportSender};

#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConfig, WebSocketTransport};

//! Transport trait definitions

use async_trait::async_trait;
use tether_core::Frame;

use crate::error::Result;

/// Events that can occur on a transport
///
/// A receiver yields `Opened` first, then any number of `Frame`s, and ends
/// with `Closed`. `Error` may appear anywhere before `Closed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Connection established
    Opened,
    /// Frame received
    Frame(Frame),
    /// Connection closed, with the close code and reason
    Closed { code: u16, reason: String },
    /// Error occurred
    Error(String),
}

/// Trait for sending data
#[async_trait]
pub trait TransportSender: Send + Sync {
    /// Send a frame
    async fn send(&self, frame: Frame) -> Result<()>;

    /// Whether the underlying socket still reports itself open
    fn is_connected(&self) -> bool;

    /// Close with a status code and reason
    async fn close(&self, code: u16, reason: &str) -> Result<()>;
}

/// Trait for receiving data
#[async_trait]
pub trait TransportReceiver: Send {
    /// Receive the next event
    async fn recv(&mut self) -> Option<TransportEvent>;
}

/// Main transport trait
///
/// One `connect` call produces one physical connection.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// The sender type for this transport
    type Sender: TransportSender + 'static;
    /// The receiver type for this transport
    type Receiver: TransportReceiver + 'static;

    /// Connect to a remote endpoint
    async fn connect(&self, url: &str) -> Result<(Self::Sender, Self::Receiver)>;
}

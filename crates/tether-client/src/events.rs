//! Observable client events
//!
//! The client never prints. Everything a UI would show goes out as a
//! [`ClientEvent`] on a broadcast channel; slow subscribers lag and skip.

use tether_core::{Frame, Message};
use tokio::sync::broadcast;
use tracing::trace;

use crate::state::ConnectionState;

#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    StateChanged(ConnectionState),
    Info(String),
    Success(String),
    Error(String),
    /// A decoded inbound message, before topic fan-out
    Received(Message),
    Sent(Frame),
    Reconnecting { attempt: u32, max: u32 },
    GaveUp { attempts: u32 },
}

#[derive(Debug, Clone)]
pub(crate) struct EventBus {
    tx: broadcast::Sender<ClientEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: ClientEvent) {
        if self.tx.send(event).is_err() {
            trace!("No event subscribers");
        }
    }

    pub fn info(&self, text: impl Into<String>) {
        self.emit(ClientEvent::Info(text.into()));
    }

    pub fn success(&self, text: impl Into<String>) {
        self.emit(ClientEvent::Success(text.into()));
    }

    pub fn error(&self, text: impl Into<String>) {
        self.emit(ClientEvent::Error(text.into()));
    }
}

//! In-memory transport for driving the client without a socket
//!
//! Every `connect` creates a [`MockConnection`] the test can script: push
//! frames, close with a code, drop the link silently, and look at what the
//! client sent.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tether_core::Frame;
use tether_transport::{
    Transport, TransportError, TransportEvent, TransportReceiver, TransportSender,
};
use tokio::sync::mpsc;

#[derive(Default)]
struct MockShared {
    refuse: AtomicBool,
    defer_open: AtomicBool,
    connects: AtomicU32,
    connections: Mutex<Vec<MockConnection>>,
}

/// Scriptable transport; clones share the same connection log
#[derive(Clone, Default)]
pub struct MockTransport {
    shared: Arc<MockShared>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `connect` calls fail
    pub fn refuse_connections(&self, refuse: bool) {
        self.shared.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Leave new connections in the handshake until the test pushes `Opened`
    pub fn defer_open(&self, defer: bool) {
        self.shared.defer_open.store(defer, Ordering::SeqCst);
    }

    /// Number of `connect` calls, including refused ones
    pub fn connect_count(&self) -> u32 {
        self.shared.connects.load(Ordering::SeqCst)
    }

    /// Number of connections actually established
    pub fn connection_count(&self) -> usize {
        self.shared.connections.lock().len()
    }

    /// The most recently established connection
    pub fn last(&self) -> Option<MockConnection> {
        self.shared.connections.lock().last().cloned()
    }

    /// Connections whose socket still reports open
    pub fn open_connections(&self) -> usize {
        self.shared
            .connections
            .lock()
            .iter()
            .filter(|c| c.is_connected())
            .count()
    }
}

/// The test's handle on one established connection
#[derive(Clone)]
pub struct MockConnection {
    events: mpsc::UnboundedSender<TransportEvent>,
    connected: Arc<AtomicBool>,
    sent: Arc<Mutex<Vec<Frame>>>,
    close_requests: Arc<Mutex<Vec<(u16, String)>>>,
}

impl MockConnection {
    pub fn push(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }

    pub fn push_text(&self, text: &str) {
        self.push(TransportEvent::Frame(Frame::Text(text.to_string())));
    }

    pub fn push_json(&self, value: Value) {
        self.push_text(&value.to_string());
    }

    pub fn push_binary(&self, data: impl Into<Bytes>) {
        self.push(TransportEvent::Frame(Frame::Binary(data.into())));
    }

    /// Finish a deferred handshake
    pub fn open(&self) {
        self.push(TransportEvent::Opened);
    }

    pub fn push_error(&self, message: &str) {
        self.push(TransportEvent::Error(message.to_string()));
    }

    /// Server-side close with a code
    pub fn close(&self, code: u16, reason: &str) {
        self.connected.store(false, Ordering::SeqCst);
        self.push(TransportEvent::Closed {
            code,
            reason: reason.to_string(),
        });
    }

    /// The socket dies without delivering any close event
    pub fn drop_silently(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<Frame> {
        self.sent.lock().clone()
    }

    /// Sent text frames that parse as JSON
    pub fn sent_json(&self) -> Vec<Value> {
        self.sent
            .lock()
            .iter()
            .filter_map(|frame| match frame {
                Frame::Text(text) => serde_json::from_str(text).ok(),
                Frame::Binary(_) => None,
            })
            .collect()
    }

    /// Sent JSON frames matching a predicate
    pub fn sent_matching(&self, pred: impl Fn(&Value) -> bool) -> Vec<Value> {
        self.sent_json().into_iter().filter(|v| pred(v)).collect()
    }

    pub fn clear_sent(&self) {
        self.sent.lock().clear();
    }

    pub fn close_requests(&self) -> Vec<(u16, String)> {
        self.close_requests.lock().clone()
    }
}

pub struct MockSender {
    conn: MockConnection,
}

#[async_trait]
impl TransportSender for MockSender {
    async fn send(&self, frame: Frame) -> tether_transport::Result<()> {
        if !self.conn.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.conn.sent.lock().push(frame);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    async fn close(&self, code: u16, reason: &str) -> tether_transport::Result<()> {
        self.conn
            .close_requests
            .lock()
            .push((code, reason.to_string()));
        if self.conn.is_connected() {
            self.conn.close(code, reason);
        }
        Ok(())
    }
}

pub struct MockReceiver {
    rx: mpsc::UnboundedReceiver<TransportEvent>,
}

#[async_trait]
impl TransportReceiver for MockReceiver {
    async fn recv(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Sender = MockSender;
    type Receiver = MockReceiver;

    async fn connect(&self, url: &str) -> tether_transport::Result<(MockSender, MockReceiver)> {
        self.shared.connects.fetch_add(1, Ordering::SeqCst);

        if self.shared.refuse.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionFailed(format!(
                "{}: connection refused",
                url
            )));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let conn = MockConnection {
            events: tx,
            connected: Arc::new(AtomicBool::new(true)),
            sent: Arc::new(Mutex::new(Vec::new())),
            close_requests: Arc::new(Mutex::new(Vec::new())),
        };
        if !self.shared.defer_open.load(Ordering::SeqCst) {
            conn.open();
        }
        self.shared.connections.lock().push(conn.clone());

        Ok((MockSender { conn }, MockReceiver { rx }))
    }
}

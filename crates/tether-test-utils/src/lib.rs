//! Common test helpers and utilities for Tether tests
//!
//! This crate provides:
//! - Condition-based waiting (no hardcoded sleeps)
//! - A scriptable in-memory transport ([`MockTransport`])
//! - A local WebSocket echo server with proper cleanup on drop
//! - Message collectors for subscription testing

use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tether_core::Message;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::protocol::{frame::coding::CloseCode, CloseFrame};
use tokio_tungstenite::tungstenite::Message as WsMessage;

pub mod mock;

pub use mock::{MockConnection, MockTransport};

/// Default test timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default condition check interval
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_millis(10);

/// Text frame that makes the echo server close the connection
///
/// `__close:4001` closes with code 4001.
pub const ECHO_CLOSE_PREFIX: &str = "__close:";

// ============================================================================
// Condition-Based Waiting
// ============================================================================

/// Wait for a condition with timeout - condition-based, not time-based
///
/// Uses tokio's clock, so under a paused runtime `max_wait` is virtual time.
pub async fn wait_for<F, Fut>(check: F, interval: Duration, max_wait: Duration) -> bool
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = Instant::now();
    while start.elapsed() < max_wait {
        if check().await {
            return true;
        }
        tokio::time::sleep(interval).await;
    }
    false
}

/// Wait for a synchronous condition
pub async fn wait_until<F>(check: F, max_wait: Duration) -> bool
where
    F: Fn() -> bool,
{
    wait_for(|| std::future::ready(check()), DEFAULT_CHECK_INTERVAL, max_wait).await
}

/// Wait for an atomic counter to reach a target value
pub async fn wait_for_count(counter: &AtomicU32, target: u32, max_wait: Duration) -> bool {
    wait_until(|| counter.load(Ordering::SeqCst) >= target, max_wait).await
}

// ============================================================================
// Echo Server - RAII wrapper with proper cleanup
// ============================================================================

/// A local WebSocket server that echoes every text and binary frame
pub struct EchoServer {
    port: u16,
    handle: tokio::task::JoinHandle<()>,
    connections: Arc<AtomicU32>,
}

impl EchoServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let connections = Arc::new(AtomicU32::new(0));
        let accepted = connections.clone();

        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                accepted.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve_echo(stream));
            }
        });

        Self {
            port,
            handle,
            connections,
        }
    }

    /// Get the WebSocket URL for this server
    pub fn url(&self) -> String {
        format!("ws://127.0.0.1:{}", self.port)
    }

    /// Number of TCP connections accepted so far
    pub fn connection_count(&self) -> u32 {
        self.connections.load(Ordering::SeqCst)
    }
}

impl Drop for EchoServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve_echo(stream: TcpStream) {
    let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };
    let (mut write, mut read) = ws.split();

    while let Some(Ok(msg)) = read.next().await {
        let reply = match msg {
            WsMessage::Text(text) => match text.strip_prefix(ECHO_CLOSE_PREFIX) {
                Some(code) => {
                    let code = code.trim().parse::<u16>().unwrap_or(1000);
                    let _ = write
                        .send(WsMessage::Close(Some(CloseFrame {
                            code: CloseCode::from(code),
                            reason: "echo server closing".into(),
                        })))
                        .await;
                    break;
                }
                None => WsMessage::Text(text),
            },
            WsMessage::Binary(data) => WsMessage::Binary(data),
            WsMessage::Close(_) => break,
            _ => continue,
        };
        if write.send(reply).await.is_err() {
            break;
        }
    }
}

// ============================================================================
// Test Collectors - for verifying received messages
// ============================================================================

/// Collector for dispatched messages with thread-safe access
#[derive(Clone)]
pub struct MessageCollector {
    messages: Arc<parking_lot::Mutex<Vec<Message>>>,
    count: Arc<AtomicU32>,
}

impl MessageCollector {
    pub fn new() -> Self {
        Self {
            messages: Arc::new(parking_lot::Mutex::new(Vec::new())),
            count: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Create a callback for subscriptions and handlers
    pub fn callback(&self) -> impl Fn(&Message) + Send + Sync + 'static {
        let messages = self.messages.clone();
        let count = self.count.clone();

        move |message| {
            messages.lock().push(message.clone());
            count.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Get the count of received messages
    pub fn count(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }

    /// Wait for at least n messages to be received
    pub async fn wait_for_count(&self, n: u32, max_wait: Duration) -> bool {
        wait_for_count(&self.count, n, max_wait).await
    }

    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().clone()
    }

    pub fn last(&self) -> Option<Message> {
        self.messages.lock().last().cloned()
    }
}

impl Default for MessageCollector {
    fn default() -> Self {
        Self::new()
    }
}

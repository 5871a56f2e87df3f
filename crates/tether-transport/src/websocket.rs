//! WebSocket transport implementation

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::borrow::Cow;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async_with_config,
    tungstenite::protocol::{
        frame::coding::CloseCode, CloseFrame, Message as WsMessage,
        WebSocketConfig as WsProtocolConfig,
    },
};
use tracing::{debug, error, info, warn};
use url::Url;

use tether_core::{Frame, CLOSE_ABNORMAL};

use crate::error::{Result, TransportError};
use crate::traits::{Transport, TransportEvent, TransportReceiver, TransportSender};

/// WebSocket configuration
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Maximum message size
    pub max_message_size: usize,
    /// Outbound queue depth before `send` waits
    pub send_queue: usize,
    /// Inbound event queue depth
    pub event_queue: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            max_message_size: 16 * 1024 * 1024,
            send_queue: 100,
            event_queue: 100,
        }
    }
}

/// WebSocket transport over tokio-tungstenite
#[derive(Debug, Clone, Default)]
pub struct WebSocketTransport {
    config: WebSocketConfig,
}

impl WebSocketTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: WebSocketConfig) -> Self {
        Self { config }
    }
}

/// Validate a `ws://` or `wss://` URL
pub fn parse_url(url: &str) -> Result<Url> {
    let parsed =
        Url::parse(url).map_err(|e| TransportError::InvalidUrl(format!("{}: {}", url, e)))?;
    match parsed.scheme() {
        "ws" | "wss" => Ok(parsed),
        other => Err(TransportError::InvalidUrl(format!(
            "{}: unsupported scheme '{}'",
            url, other
        ))),
    }
}

/// WebSocket sender
pub struct WebSocketSender {
    tx: mpsc::Sender<WsMessage>,
    connected: Arc<Mutex<bool>>,
}

#[async_trait]
impl TransportSender for WebSocketSender {
    async fn send(&self, frame: Frame) -> Result<()> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        let msg = match frame {
            Frame::Text(text) => WsMessage::Text(text),
            Frame::Binary(data) => WsMessage::Binary(data.to_vec()),
        };

        self.tx
            .send(msg)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    fn is_connected(&self) -> bool {
        *self.connected.lock()
    }

    async fn close(&self, code: u16, reason: &str) -> Result<()> {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: Cow::Owned(reason.to_string()),
        };
        let _ = self.tx.send(WsMessage::Close(Some(frame))).await;
        *self.connected.lock() = false;
        Ok(())
    }
}

/// WebSocket receiver
pub struct WebSocketReceiver {
    rx: mpsc::Receiver<TransportEvent>,
}

#[async_trait]
impl TransportReceiver for WebSocketReceiver {
    async fn recv(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    type Sender = WebSocketSender;
    type Receiver = WebSocketReceiver;

    async fn connect(&self, url: &str) -> Result<(Self::Sender, Self::Receiver)> {
        let url = parse_url(url)?;
        info!("Connecting to WebSocket: {}", url);

        let ws_config = WsProtocolConfig {
            max_message_size: Some(self.config.max_message_size),
            ..Default::default()
        };

        let (ws_stream, response) =
            connect_async_with_config(url.as_str(), Some(ws_config), false)
                .await
                .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        debug!("WebSocket connected, response: {:?}", response.status());

        let (write, read) = ws_stream.split();

        let (send_tx, mut send_rx) = mpsc::channel::<WsMessage>(self.config.send_queue);
        let (event_tx, event_rx) = mpsc::channel::<TransportEvent>(self.config.event_queue);

        let connected = Arc::new(Mutex::new(true));
        let connected_write = connected.clone();
        let connected_read = connected.clone();

        // Spawn writer task
        tokio::spawn(async move {
            let mut write = write;
            while let Some(msg) = send_rx.recv().await {
                let closing = matches!(msg, WsMessage::Close(_));
                if let Err(e) = write.send(msg).await {
                    error!("WebSocket write error: {}", e);
                    break;
                }
                if closing {
                    break;
                }
            }
            *connected_write.lock() = false;
        });

        // Spawn reader task
        tokio::spawn(async move {
            let mut read = read;

            let _ = event_tx.send(TransportEvent::Opened).await;

            let mut closed = false;
            while let Some(result) = read.next().await {
                match result {
                    Ok(msg) => match msg {
                        WsMessage::Binary(data) => {
                            let _ = event_tx
                                .send(TransportEvent::Frame(Frame::Binary(Bytes::from(data))))
                                .await;
                        }
                        WsMessage::Text(text) => {
                            let _ = event_tx.send(TransportEvent::Frame(Frame::Text(text))).await;
                        }
                        WsMessage::Ping(_) => {
                            // Pong is handled automatically by tungstenite
                            debug!("Received ping");
                        }
                        WsMessage::Pong(_) => {
                            debug!("Received pong");
                        }
                        WsMessage::Close(frame) => {
                            let (code, reason) = frame
                                .map(|f| (u16::from(f.code), f.reason.to_string()))
                                .unwrap_or((1005, String::new()));
                            info!("WebSocket closed: {} {}", code, reason);
                            let _ = event_tx.send(TransportEvent::Closed { code, reason }).await;
                            closed = true;
                            break;
                        }
                        WsMessage::Frame(_) => {
                            // Raw frame, ignore
                        }
                    },
                    Err(e) => {
                        warn!("WebSocket read error: {}", e);
                        let _ = event_tx.send(TransportEvent::Error(e.to_string())).await;
                        let _ = event_tx
                            .send(TransportEvent::Closed {
                                code: CLOSE_ABNORMAL,
                                reason: e.to_string(),
                            })
                            .await;
                        closed = true;
                        break;
                    }
                }
            }

            if !closed {
                let _ = event_tx
                    .send(TransportEvent::Closed {
                        code: CLOSE_ABNORMAL,
                        reason: "stream ended".to_string(),
                    })
                    .await;
            }

            *connected_read.lock() = false;
        });

        let sender = WebSocketSender {
            tx: send_tx,
            connected,
        };

        let receiver = WebSocketReceiver { rx: event_rx };

        Ok((sender, receiver))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_url() {
        assert!(parse_url("ws://localhost:8080/stream").is_ok());
        assert!(parse_url("wss://echo.websocket.org").is_ok());
        assert!(matches!(
            parse_url("http://localhost"),
            Err(TransportError::InvalidUrl(_))
        ));
        assert!(matches!(parse_url("not a url"), Err(TransportError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let transport = WebSocketTransport::new();
        let result = transport.connect("ws://127.0.0.1:1").await;
        assert!(matches!(result, Err(TransportError::ConnectionFailed(_))));
    }
}

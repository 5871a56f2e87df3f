//! Client builder pattern

use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tether_core::{DecoderKind, DecoderRegistry, Inflate, Message, ZlibInflater};
use tether_transport::{Transport, WebSocketTransport};

use crate::config::{BinaryMode, ClientConfig};
use crate::{Client, Result};

/// Builder for [`Client`]
pub struct ClientBuilder {
    config: ClientConfig,
    decoders: DecoderRegistry,
    inflater: Arc<dyn Inflate>,
}

impl ClientBuilder {
    /// Create a new builder
    pub fn new(url: &str) -> Self {
        Self::from_config(ClientConfig::new(url))
    }

    /// Start from a loaded configuration
    pub fn from_config(config: ClientConfig) -> Self {
        Self {
            config,
            decoders: DecoderRegistry::new(),
            inflater: Arc::new(ZlibInflater::new()),
        }
    }

    /// Enable/disable auto-reconnect
    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.config.auto_reconnect = enabled;
        self
    }

    /// Give up after this many consecutive failed reconnects
    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.config.max_reconnect_attempts = attempts;
        self
    }

    /// Set the delay before each reconnect attempt
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.config.reconnect_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Grow the reconnect delay by `multiplier` per attempt, up to `max_delay`
    pub fn backoff(mut self, multiplier: f64, max_delay: Duration) -> Self {
        self.config.backoff_multiplier = multiplier;
        self.config.max_reconnect_delay_ms = max_delay.as_millis() as u64;
        self
    }

    /// Set the heartbeat period; `None` turns heartbeats off
    pub fn heartbeat(mut self, interval: Option<Duration>) -> Self {
        self.config.heartbeat_interval_ms = interval.map(|d| d.as_millis() as u64);
        self
    }

    pub fn liveness_check(mut self, interval: Duration) -> Self {
        self.config.liveness_check_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn binary_mode(mut self, mode: BinaryMode) -> Self {
        self.config.binary_mode = mode;
        self
    }

    /// Decoder for raw binary frames
    pub fn decoder(mut self, decoder: impl Into<DecoderKind>) -> Self {
        self.config.decoder = decoder.into();
        self
    }

    /// Register a named decoder
    pub fn register_decoder<F>(mut self, name: &str, decoder: F) -> Self
    where
        F: Fn(&Bytes) -> Option<Message> + Send + Sync + 'static,
    {
        self.decoders.register(name, decoder);
        self
    }

    /// Register a message type for the `typed` decoder
    pub fn register_message_type<F>(mut self, type_id: u32, name: &str, decoder: F) -> Self
    where
        F: Fn(&Bytes) -> Option<Message> + Send + Sync + 'static,
    {
        self.decoders.register_message_type(type_id, name, decoder);
        self
    }

    /// Replace the inflate codec used in compressed mode
    pub fn inflater(mut self, inflater: impl Inflate + 'static) -> Self {
        self.inflater = Arc::new(inflater);
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Build over the default WebSocket transport
    pub fn build(self) -> Client {
        self.build_with(WebSocketTransport::new())
    }

    /// Build over a custom transport
    pub fn build_with<T: Transport>(self, transport: T) -> Client<T> {
        Client::from_parts(self.config, transport, self.decoders, self.inflater)
    }

    /// Build and connect
    pub async fn connect(self) -> Result<Client> {
        let client = self.build();
        client.connect().await?;
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_sets_config() {
        let builder = ClientBuilder::new("ws://localhost:9000")
            .auto_reconnect(false)
            .max_reconnect_attempts(3)
            .reconnect_delay(Duration::from_millis(500))
            .heartbeat(None)
            .binary_mode(BinaryMode::Compressed)
            .decoder("json");

        let config = builder.config();
        assert_eq!(config.url, "ws://localhost:9000");
        assert!(!config.auto_reconnect);
        assert_eq!(config.max_reconnect_attempts, 3);
        assert_eq!(config.reconnect_delay_ms, 500);
        assert_eq!(config.heartbeat_interval_ms, None);
        assert_eq!(config.binary_mode, BinaryMode::Compressed);
        assert_eq!(config.decoder, DecoderKind::Json);
    }
}

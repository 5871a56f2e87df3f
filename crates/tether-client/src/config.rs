//! Client configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tether_core::{time, DecoderKind};

/// Longest period any client timer runs with; larger settings are clamped
pub const MAX_TIMER_PERIOD: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// How binary frames are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinaryMode {
    /// Run the configured decoder over the raw bytes
    #[default]
    Raw,
    /// Inflate first, then classify as JSON or text
    Compressed,
}

/// Everything a [`Client`](crate::Client) needs to know up front
///
/// Deserializes from a partial document; missing keys take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub url: String,
    pub max_reconnect_attempts: u32,
    pub reconnect_delay_ms: u64,
    /// 1.0 keeps the delay fixed
    pub backoff_multiplier: f64,
    pub max_reconnect_delay_ms: u64,
    pub auto_reconnect: bool,
    /// `None` disables the heartbeat
    pub heartbeat_interval_ms: Option<u64>,
    pub liveness_check_interval_ms: u64,
    pub binary_mode: BinaryMode,
    pub decoder: DecoderKind,
    /// Buffered [`ClientEvent`](crate::ClientEvent)s per subscriber
    pub event_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_reconnect_attempts: 5,
            reconnect_delay_ms: 3000,
            backoff_multiplier: 1.0,
            max_reconnect_delay_ms: 30_000,
            auto_reconnect: true,
            heartbeat_interval_ms: Some(30_000),
            liveness_check_interval_ms: 60_000,
            binary_mode: BinaryMode::Raw,
            decoder: DecoderKind::Auto,
            event_capacity: 256,
        }
    }
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn heartbeat_interval(&self) -> Option<Duration> {
        self.heartbeat_interval_ms
            .filter(|ms| *ms > 0)
            .map(|ms| time::from_millis(ms).min(MAX_TIMER_PERIOD))
    }

    pub fn liveness_interval(&self) -> Duration {
        time::from_millis(self.liveness_check_interval_ms.max(1)).min(MAX_TIMER_PERIOD)
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: self.max_reconnect_attempts,
            delay: time::from_millis(self.reconnect_delay_ms).min(MAX_TIMER_PERIOD),
            multiplier: self.backoff_multiplier,
            max_delay: time::from_millis(self.max_reconnect_delay_ms).min(MAX_TIMER_PERIOD),
        }
    }
}

/// Retry bound and delay schedule
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl ReconnectPolicy {
    /// Delay before the given attempt (1-based)
    ///
    /// `delay * multiplier^(attempt-1)`, capped at `max_delay`. A multiplier
    /// at or below 1.0 gives a fixed delay.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if self.multiplier <= 1.0 || attempt <= 1 {
            return self.delay;
        }
        let factor = self.multiplier.powi((attempt - 1).min(64) as i32);
        time::scale(self.delay, factor).min(self.max_delay.max(self.delay))
    }

    pub fn exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::new("ws://localhost:8080");
        assert_eq!(config.max_reconnect_attempts, 5);
        assert_eq!(config.reconnect_delay_ms, 3000);
        assert!(config.auto_reconnect);
        assert_eq!(config.heartbeat_interval(), Some(Duration::from_secs(30)));
        assert_eq!(config.liveness_interval(), Duration::from_secs(60));
        assert_eq!(config.binary_mode, BinaryMode::Raw);
        assert_eq!(config.decoder, DecoderKind::Auto);
    }

    #[test]
    fn test_fixed_delay() {
        let policy = ClientConfig::default().reconnect_policy();
        for attempt in 1..=5 {
            assert_eq!(policy.delay_for_attempt(attempt), Duration::from_secs(3));
        }
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = ReconnectPolicy {
            max_attempts: 10,
            delay: Duration::from_millis(1000),
            multiplier: 2.0,
            max_delay: Duration::from_millis(5000),
        };
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(4000));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(5000));
        assert_eq!(policy.delay_for_attempt(40), Duration::from_millis(5000));
    }

    #[test]
    fn test_exhausted() {
        let policy = ReconnectPolicy {
            max_attempts: 3,
            ..ClientConfig::default().reconnect_policy()
        };
        assert!(!policy.exhausted(2));
        assert!(policy.exhausted(3));
    }

    #[test]
    fn test_heartbeat_disabled() {
        let config = ClientConfig {
            heartbeat_interval_ms: None,
            ..Default::default()
        };
        assert_eq!(config.heartbeat_interval(), None);
    }

    #[test]
    fn test_huge_intervals_are_clamped() {
        let config = ClientConfig {
            heartbeat_interval_ms: Some(u64::MAX),
            liveness_check_interval_ms: u64::MAX,
            reconnect_delay_ms: u64::MAX,
            ..Default::default()
        };
        assert_eq!(config.heartbeat_interval(), Some(MAX_TIMER_PERIOD));
        assert_eq!(config.liveness_interval(), MAX_TIMER_PERIOD);
        assert_eq!(config.reconnect_policy().delay, MAX_TIMER_PERIOD);
        // liveness math on the clamped period must not overflow
        let _ = config.liveness_interval() * 2;
    }
}

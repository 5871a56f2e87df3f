//! Connection lifecycle states

use std::fmt;

/// Where the client is in its connection lifecycle
///
/// ```text
/// Idle ──connect──► Connecting ──opened──► Open ──closed──► Closed
///   ▲                   │                                     │
///   │                   └──── error/closed ──► Closed         │ code != 1000
///   │                                                         ▼ auto-reconnect
///   └──── disconnect() (from anywhere) ◄──── GaveUp ◄── Reconnecting
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Open,
    Closing,
    Closed { code: u16, reason: String },
    /// Waiting out the delay before the given attempt
    Reconnecting { attempt: u32 },
    /// Retries exhausted; only a manual `connect()` leaves this state
    GaveUp,
}

impl ConnectionState {
    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    /// Connecting or open: a `connect()` call has nothing to do
    pub fn is_active(&self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Open)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed { .. } => "closed",
            ConnectionState::Reconnecting { .. } => "reconnecting",
            ConnectionState::GaveUp => "gave up",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Closed { code, reason } if reason.is_empty() => {
                write!(f, "closed ({})", code)
            }
            ConnectionState::Closed { code, reason } => write!(f, "closed ({}: {})", code, reason),
            ConnectionState::Reconnecting { attempt } => write!(f, "reconnecting (#{})", attempt),
            other => f.write_str(other.name()),
        }
    }
}

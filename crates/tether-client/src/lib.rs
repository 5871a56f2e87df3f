//! Tether Client Library
//!
//! A WebSocket client that keeps one logical, always-connected channel over
//! an unreliable link: it reconnects, checks liveness, multiplexes topics
//! over the single connection, decodes whatever the server sends and runs
//! scheduled sends while connected.
//!
//! # Example
//!
//! ```ignore
//! use tether_client::Client;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = Client::builder("wss://feed.example.com/ws")
//!         .max_reconnect_attempts(10)
//!         .build();
//!
//!     client.subscribe("quotes", |msg| println!("{}", msg));
//!     client.connect().await?;
//!
//!     client.send(serde_json::json!({"type": "hello"}));
//!     client.add_task(serde_json::json!({"type": "ping"}), std::time::Duration::from_secs(5))?;
//!
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod router;
pub mod schedule;
pub mod state;
pub mod timers;

pub use builder::ClientBuilder;
pub use client::Client;
pub use config::{BinaryMode, ClientConfig, ReconnectPolicy};
pub use error::{ClientError, Result};
pub use events::ClientEvent;
pub use router::{HandlerId, SubscriptionId};
pub use schedule::{ScheduledTask, TaskId};
pub use state::ConnectionState;
pub use timers::TimerKey;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::builder::ClientBuilder;
    pub use crate::client::Client;
    pub use crate::config::{BinaryMode, ClientConfig};
    pub use crate::error::{ClientError, Result};
    pub use crate::events::ClientEvent;
    pub use crate::state::ConnectionState;
    pub use tether_core::{Message, Payload};
}

//! Client error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The attempt was superseded by `disconnect()` or a newer connection
    #[error("connection attempt cancelled")]
    Cancelled,

    #[error("invalid task: {0}")]
    InvalidTask(String),

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("decode error: {0}")]
    Core(#[from] tether_core::Error),

    #[error("transport error: {0}")]
    Transport(#[from] tether_transport::TransportError),
}

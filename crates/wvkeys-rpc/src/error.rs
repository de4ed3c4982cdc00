//! Error types for wvkeys-rpc

use std::time::Duration;

use thiserror::Error;
use wvkeys_types::OpCode;

/// Result type alias for RPC calls
pub type Result<T> = std::result::Result<T, RpcError>;

/// Failures at the channel layer.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Send error: {0}")]
    Send(String),

    #[error("Subscribe error: {0}")]
    Subscribe(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Transport closed")]
    Closed,

    #[error("Unsupported transport URI: {0:?}")]
    UnsupportedUri(String),
}

/// Failures surfaced to callers of [`crate::RpcClient`].
#[derive(Debug, Error)]
pub enum RpcError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Outcome unknown: the service may still act on the request.
    #[error("{op} request {correlation_id} timed out after {timeout:?}")]
    Timeout {
        op: OpCode,
        correlation_id: String,
        timeout: Duration,
    },

    /// The service replied with an error; the message is shown as-is.
    #[error("{0}")]
    Remote(String),

    #[error("{0} cannot be sent as a request")]
    InvalidOperation(OpCode),

    #[error("Malformed reply: {0}")]
    MalformedReply(String),
}

impl RpcError {
    /// Transport failures and timeouts may succeed if the caller tries again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

//! Error types for agentlink-client.

use std::time::Duration;

use thiserror::Error;

use crate::connection::ConnectionState;

/// Main error type for all agentlink operations.
#[derive(Debug, Error)]
pub enum AgentLinkError {
    /// I/O error while dialing or using the transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket transport error (dial, upgrade, read or write).
    #[error("WebSocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),

    /// The control plane base URL cannot be turned into a link endpoint.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Protocol error (malformed frame, missing correlation id, etc.).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A connect attempt is already in flight.
    #[error("Connect already in progress")]
    AlreadyConnecting,

    /// The peer did not answer the auth frame within the deadline.
    #[error("Handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    /// The peer rejected the handshake or answered with something else.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// A command was issued while the link is down.
    #[error("Not connected")]
    NotConnected,

    /// The caller's cancellation token fired before a response arrived.
    #[error("Cancelled")]
    Cancelled,

    /// No response arrived within the call deadline.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Writing the command frame to the transport failed.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// A correlation id is already registered.
    #[error("Duplicate correlation id: {0}")]
    DuplicateCorrelationId(String),

    /// Rejected connection state transition.
    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: ConnectionState,
        to: ConnectionState,
    },

    /// Connection closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,
}

impl From<tokio_tungstenite::tungstenite::Error> for AgentLinkError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(err))
    }
}

/// Result type alias using AgentLinkError.
pub type Result<T> = std::result::Result<T, AgentLinkError>;

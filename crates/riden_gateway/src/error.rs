use std::net::SocketAddr;

use thiserror::Error;

/// Errors that can occur while encoding or decoding an envelope.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EnvelopeError {
    /// The frame was not a valid envelope.
    #[error("invalid envelope: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur while delivering a payload to a client connection.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DeliveryError {
    /// No client is registered under this connection name.
    #[error("no client connection named '{0}'")]
    UnknownClient(String),

    /// The client's write queue is at capacity; the payload was dropped.
    #[error("write queue full for client '{0}'")]
    QueueFull(String),

    /// The client's write loop has already exited.
    #[error("write queue closed for client '{0}'")]
    Closed(String),

    /// Payloads are sent as text frames and must be valid UTF-8.
    #[error("payload is not valid UTF-8")]
    NotUtf8,
}

/// Errors that can occur while forwarding a client message to the adapter.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ForwardError {
    /// No adapter is connected to the control path.
    #[error("adapter is not connected")]
    NotConnected,

    /// The adapter write queue is at capacity; the message was dropped.
    #[error("adapter write queue full")]
    QueueFull,

    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
}

/// Errors that can occur while running the gateway.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GatewayError {
    /// Failed to bind the listening socket.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// A client route already exists under this connection name.
    #[error("connection '{0}' already registered")]
    DuplicateConnection(String),

    /// A second adapter tried to take the control connection.
    #[error("adapter already connected from {0}")]
    ControlOccupied(SocketAddr),
}

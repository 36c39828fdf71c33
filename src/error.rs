use riden_gateway::EnvelopeError;
use thiserror::Error;

use crate::message::MessageKind;

/// Errors in a configured retry status-code pattern.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum RetryPatternError {
    /// A pattern was not exactly three characters long.
    #[error("retry pattern '{0}' must be exactly 3 characters")]
    Length(String),

    /// A pattern contained something other than a digit or `x`.
    #[error("retry pattern '{0}' may only contain digits and 'x'")]
    Character(String),

    /// The observed status code was not a three digit code.
    #[error("status code {0} is not a 3 digit code")]
    StatusCode(u16),
}

/// Errors that can occur while decoding an inbound frame or payload.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DecodeError {
    /// The frame was not a valid envelope.
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    /// The payload was not the JSON record it claimed to be.
    #[error("invalid payload: {0}")]
    Json(#[from] serde_json::Error),

    /// The payload has no `MessageType` field.
    #[error("payload has no MessageType")]
    MissingKind,

    /// The payload's `MessageType` is not one we know.
    #[error("unknown MessageType '{0}'")]
    UnknownKind(String),

    /// A service-originated kind arrived from a client.
    #[error("'{0}' is not accepted from clients")]
    WrongDirection(MessageKind),
}

/// Errors that can occur while handing a message to a queue without waiting.
///
/// Every variant means the message was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum DispatchError {
    /// No relay channel is installed for this kind, usually because the
    /// upstream stream set is reconnecting.
    #[error("no relay channel for '{0}'")]
    NoChannel(MessageKind),

    /// The queue for this kind is at capacity.
    #[error("queue full for '{0}'")]
    Full(MessageKind),

    /// The consumer for this kind has gone away.
    #[error("queue closed for '{0}'")]
    Closed(MessageKind),

    /// The downstream link is not connected.
    #[error("downstream link detached, dropping '{0}'")]
    Detached(MessageKind),

    /// The record's connection type names no known routing target.
    #[error("unknown connection type '{0}'")]
    UnknownConnType(String),
}

/// Why a single inbound frame was not relayed.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FrameError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// Why a service message was not delivered to the gateway.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DeliverError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// The record could not be encoded as JSON.
    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Terminal errors from the downstream link supervisor.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LinkError {
    /// The gateway refused the upgrade with a status the retry policy does not
    /// cover, so the link gives up.
    #[error("gateway refused connection with status {status}, not retrying")]
    Abandoned { status: u16 },

    /// The retry policy is malformed.
    #[error(transparent)]
    RetryPolicy(#[from] RetryPatternError),
}

/// Errors that stop the adapter.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AdapterError {
    #[error(transparent)]
    Link(#[from] LinkError),

    /// The retry policy is malformed.
    #[error("invalid retry policy: {0}")]
    RetryPolicy(#[from] RetryPatternError),

    /// The gateway URL could not be parsed.
    #[error("invalid gateway url '{url}': {source}")]
    GatewayUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// The gateway URL is not a WebSocket URL.
    #[error("gateway url must use ws or wss, got '{0}'")]
    GatewayScheme(String),

    /// A queue capacity or timing setting is out of range.
    #[error("invalid setting {name}: {reason}")]
    Setting {
        name: &'static str,
        reason: &'static str,
    },
}

/// Errors that can occur while installing the log subscriber.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LoggingError {
    /// The log file could not be created or opened.
    #[error("failed to open log file {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A global subscriber was already installed.
    #[error(transparent)]
    Install(#[from] tracing::subscriber::SetGlobalDefaultError),
}

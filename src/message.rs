//! The client-facing message model.
//!
//! Every payload a client sends or receives is a JSON object with a top-level
//! `MessageType` field naming its kind. Field names on the wire are
//! PascalCase, and missing fields decode to their defaults.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DecodeError;

/// The closed set of message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    ReserveTrip,
    Ack,
    AtDock,
    OnBoat,
    OffBoat,
    BoatStatus,
    Arrived,
}

/// Which way a kind flows through the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Sent by clients, relayed to the logic service.
    ToLogic,
    /// Sent by the logic service, delivered to clients.
    ToClients,
}

impl MessageKind {
    pub const COUNT: usize = 7;

    pub const ALL: [MessageKind; Self::COUNT] = [
        MessageKind::ReserveTrip,
        MessageKind::Ack,
        MessageKind::AtDock,
        MessageKind::OnBoat,
        MessageKind::OffBoat,
        MessageKind::BoatStatus,
        MessageKind::Arrived,
    ];

    /// The `MessageType` value on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::ReserveTrip => "reserveTrip",
            MessageKind::Ack => "ack",
            MessageKind::AtDock => "atDock",
            MessageKind::OnBoat => "onBoat",
            MessageKind::OffBoat => "offBoat",
            MessageKind::BoatStatus => "boatStatus",
            MessageKind::Arrived => "arrived",
        }
    }

    pub fn from_wire(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }

    pub fn direction(self) -> Direction {
        match self {
            MessageKind::ReserveTrip
            | MessageKind::AtDock
            | MessageKind::OnBoat
            | MessageKind::OffBoat => Direction::ToLogic,
            MessageKind::Ack | MessageKind::BoatStatus | MessageKind::Arrived => {
                Direction::ToClients
            }
        }
    }

    /// Position in [`MessageKind::ALL`], for per-kind counters.
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Service states carried by `BoatStatus`.
pub mod service_state {
    pub const UNKNOWN: i32 = 0;
    pub const ON_TIME: i32 = 1;
    pub const DELAYED: i32 = 2;
    pub const UNAVAILABLE: i32 = 3;
}

/// Gangway positions on a dock.
pub mod gangway {
    pub const FORE: &str = "fore";
    pub const AFT: &str = "aft";
}

/// How a record's connection name should be interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnType {
    /// A single WebSocket client, addressed by connection name.
    #[default]
    WebSocket,
    /// Every connected client.
    All,
    /// Anything else. Kept verbatim so routing can reject it.
    Other(String),
}

impl ConnType {
    pub fn as_str(&self) -> &str {
        match self {
            ConnType::WebSocket => "websocket",
            ConnType::All => "all",
            ConnType::Other(value) => value,
        }
    }
}

impl From<&str> for ConnType {
    fn from(value: &str) -> Self {
        match value {
            "websocket" => ConnType::WebSocket,
            "all" => ConnType::All,
            other => ConnType::Other(other.to_owned()),
        }
    }
}

impl From<String> for ConnType {
    fn from(value: String) -> Self {
        ConnType::from(value.as_str())
    }
}

impl fmt::Display for ConnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which connection a record came from or is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClientData {
    pub conn_name: String,
    pub conn_type: ConnType,
}

impl ClientData {
    pub fn websocket(conn_name: impl Into<String>) -> Self {
        Self {
            conn_name: conn_name.into(),
            conn_type: ConnType::WebSocket,
        }
    }

    pub fn all() -> Self {
        Self {
            conn_name: String::new(),
            conn_type: ConnType::All,
        }
    }
}

/// A record together with its routing metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Routed<T> {
    pub client: ClientData,
    pub message: T,
}

impl<T> Routed<T> {
    pub fn new(client: ClientData, message: T) -> Self {
        Self { client, message }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Address {
    pub number: i32,
    pub street: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Dock {
    pub address: Address,
    pub gangway: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Boat {
    #[serde(rename = "BoatID")]
    pub boat_id: i32,
    pub name: String,
}

/// A client asks for a trip between two docks.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ReserveTrip {
    pub message_type: String,
    pub auth_token: String,
    #[serde(rename = "ClientID")]
    pub client_id: String,
    pub source_dock: Dock,
    pub destination_dock: Dock,
}

/// The logic service's answer to a `ReserveTrip`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Ack {
    pub message_type: String,
    #[serde(rename = "ClientID")]
    pub client_id: String,
    pub is_reserved: bool,
    pub boat: Boat,
    #[serde(rename = "TransactionID")]
    pub transaction_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct AtDock {
    pub message_type: String,
    #[serde(rename = "ClientID")]
    pub client_id: String,
    pub boat: Boat,
    pub dock: Dock,
    #[serde(rename = "TransactionID")]
    pub transaction_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct OnBoat {
    pub message_type: String,
    #[serde(rename = "ClientID")]
    pub client_id: String,
    pub boat: Boat,
    #[serde(rename = "TransactionID")]
    pub transaction_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct OffBoat {
    pub message_type: String,
    #[serde(rename = "ClientID")]
    pub client_id: String,
    pub boat: Boat,
    #[serde(rename = "TransactionID")]
    pub transaction_id: String,
}

/// Position and service state of one boat, sent to every client.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct BoatStatus {
    pub message_type: String,
    pub boat: Boat,
    pub service_state: i32,
    pub previous_dock: Dock,
    pub current_dock: Dock,
    pub next_dock: Dock,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Arrived {
    pub message_type: String,
    #[serde(rename = "ClientID")]
    pub client_id: String,
    pub boat: Boat,
    pub dock: Dock,
    #[serde(rename = "TransactionID")]
    pub transaction_id: String,
}

/// A client-facing record of a fixed kind.
pub trait ApiMessage: Serialize + DeserializeOwned + Send + 'static {
    const KIND: MessageKind;
}

macro_rules! api_message {
    ($($ty:ident => $kind:ident),* $(,)?) => {
        $(
            impl ApiMessage for $ty {
                const KIND: MessageKind = MessageKind::$kind;
            }
        )*
    };
}

api_message! {
    ReserveTrip => ReserveTrip,
    Ack => Ack,
    AtDock => AtDock,
    OnBoat => OnBoat,
    OffBoat => OffBoat,
    BoatStatus => BoatStatus,
    Arrived => Arrived,
}

#[derive(Deserialize)]
struct Discriminant {
    #[serde(rename = "MessageType")]
    message_type: Option<String>,
}

/// Read only the `MessageType` of a payload.
pub fn peek_kind(payload: &[u8]) -> Result<MessageKind, DecodeError> {
    let Discriminant { message_type } = serde_json::from_slice(payload)?;
    let message_type = message_type.ok_or(DecodeError::MissingKind)?;
    MessageKind::from_wire(&message_type).ok_or(DecodeError::UnknownKind(message_type))
}

/// Decode a payload whose kind is already known.
pub fn decode_payload<T: ApiMessage>(payload: &[u8]) -> Result<T, DecodeError> {
    Ok(serde_json::from_slice(payload)?)
}

pub fn encode_payload<T: ApiMessage>(message: &T) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(message)
}

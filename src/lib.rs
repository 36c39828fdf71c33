//! riden: bridges the client-facing WebSocket gateway and the trip logic
//! service's streaming RPCs.
//!
//! Client messages arrive from the gateway wrapped in envelopes, are relayed
//! by kind onto bounded channels, translated, and sent on the matching RPC
//! stream. Service messages come back the other way and are addressed to one
//! client or to all of them.

pub mod adapter;
pub mod config;
pub mod downstream;
pub mod error;
pub mod logging;
pub mod message;
pub mod relay;
pub mod retry;
pub mod translate;
pub mod tripwire;
pub mod upstream;

pub mod proto {
    include!(concat!(env!("OUT_DIR"), "/riden.rs"));
}

pub use adapter::Adapter;
pub use config::AdapterConfig;
pub use error::{AdapterError, LinkError};
pub use message::MessageKind;
pub use tripwire::Tripwire;

//! WebSocket transport gateway for riden.
//!
//! API clients connect on the client path; the adapter holds the single
//! control connection on the adapter path. Every frame that crosses the
//! control connection is an [`Envelope`]: client messages are wrapped with the
//! sender's connection name on the way in, and the adapter addresses replies by
//! connection name (or [`ALL_CLIENTS`]) on the way out.

pub mod config;
pub mod control;
pub mod envelope;
pub mod error;
pub mod registry;
pub mod server;

pub use config::{ADAPTER_PATH, CLIENT_PATH, GatewayConfig};
pub use control::{ControlGuard, ControlHandle, ControlSlot};
pub use envelope::{ALL_CLIENTS, Envelope};
pub use error::{DeliveryError, EnvelopeError, ForwardError, GatewayError};
pub use registry::{ClientRegistry, ClientRoute, RouteGuard};
pub use server::Gateway;

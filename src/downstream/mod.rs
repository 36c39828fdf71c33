//! The adapter's single connection to the gateway.

pub mod link;
pub mod outbound;
pub(crate) mod read_loop;
pub(crate) mod write_loop;

pub use link::{DownstreamLink, SessionEnd};
pub use outbound::OutboundPort;

//! The adapter's streams to the trip logic service.

pub mod route;
pub mod routes;
pub mod supervisor;

pub use route::{
    ConnectorFn, FaultReason, LogicClient, RequestStream, RouteContext, StreamFault,
    make_connector,
};
pub use routes::RouteTable;
pub use supervisor::StreamSetSupervisor;

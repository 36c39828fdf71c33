use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tonic::{Response, Status, Streaming};
use tracing::info;

use crate::message::{self, ApiMessage, MessageKind, Routed};
use crate::proto;
use crate::upstream::route::{
    DownlinkRoute, ErasedRoute, LogicClient, RequestStream, UplinkRoute, make_connector,
};

/// The set of streams opened on every connection to the logic service.
#[derive(Default)]
pub struct RouteTable {
    routes: Vec<Arc<dyn ErasedRoute>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every kind, each on its own stream of the `TripLogic` service.
    pub fn standard() -> Self {
        let mut table = Self::new();

        table.register_uplink::<message::ReserveTrip, proto::ReserveTripMessage, _, _>(
            |mut client, requests| async move {
                client.reserve_trip(requests).await.map(Response::into_inner)
            },
        );
        table.register_uplink::<message::AtDock, proto::AtDockMessage, _, _>(
            |mut client, requests| async move {
                client.at_dock(requests).await.map(Response::into_inner)
            },
        );
        table.register_uplink::<message::OnBoat, proto::OnBoatMessage, _, _>(
            |mut client, requests| async move {
                client.on_boat(requests).await.map(Response::into_inner)
            },
        );
        table.register_uplink::<message::OffBoat, proto::OffBoatMessage, _, _>(
            |mut client, requests| async move {
                client.off_boat(requests).await.map(Response::into_inner)
            },
        );

        table.register_downlink::<proto::AckMessage, message::Ack, _, _>(
            |mut client, requests| async move {
                client.ack(requests).await.map(Response::into_inner)
            },
        );
        table.register_downlink::<proto::BoatStatusMessage, message::BoatStatus, _, _>(
            |mut client, requests| async move {
                client.boat_status(requests).await.map(Response::into_inner)
            },
        );
        table.register_downlink::<proto::ArrivedMessage, message::Arrived, _, _>(
            |mut client, requests| async move {
                client.arrived(requests).await.map(Response::into_inner)
            },
        );

        table
    }

    /// Register a stream that carries client messages of kind `Api` to the
    /// logic service as `Req` records.
    ///
    /// # Example
    /// ```ignore
    /// use tonic::Response;
    ///
    /// table.register_uplink::<message::ReserveTrip, proto::ReserveTripMessage, _, _>(
    ///     |mut client, requests| async move {
    ///         client.reserve_trip(requests).await.map(Response::into_inner)
    ///     },
    /// );
    /// ```
    pub fn register_uplink<Api, Req, F, Fut>(&mut self, connector: F)
    where
        Api: ApiMessage,
        Req: From<Routed<Api>> + Send + 'static,
        F: Fn(LogicClient, RequestStream<Req>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Streaming<proto::Empty>, Status>> + Send + 'static,
    {
        let route = UplinkRoute::<Api, Req>::new(make_connector(connector));
        self.insert(Arc::new(route));
    }

    /// Register a stream that carries `Resp` records from the logic service to
    /// clients as messages of kind `Api`.
    pub fn register_downlink<Resp, Api, F, Fut>(&mut self, connector: F)
    where
        Resp: Send + 'static,
        Api: ApiMessage,
        Routed<Api>: From<Resp>,
        F: Fn(LogicClient, RequestStream<proto::Empty>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Streaming<Resp>, Status>> + Send + 'static,
    {
        let route = DownlinkRoute::<Resp, Api>::new(make_connector(connector));
        self.insert(Arc::new(route));
    }

    /// Kinds with a registered stream, in registration order.
    pub fn kinds(&self) -> Vec<MessageKind> {
        self.routes.iter().map(|route| route.kind()).collect()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Arc<dyn ErasedRoute>> {
        self.routes.iter()
    }

    /// Registering a kind twice replaces the earlier route.
    fn insert(&mut self, route: Arc<dyn ErasedRoute>) {
        let kind = route.kind();
        self.routes.retain(|existing| existing.kind() != kind);
        self.routes.push(route);
        info!(kind = %kind, "Registered stream route");
    }
}

impl fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteTable")
            .field("kinds", &self.kinds())
            .finish()
    }
}

#![allow(dead_code)]

use futures::{Stream, StreamExt};
use riden::proto;
use riden::proto::trip_logic_server::{TripLogic, TripLogicServer};
use riden_gateway::{Gateway, GatewayConfig};
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tonic::{Request, Response, Status, Streaming};

pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

type ResponseStream<T> = Pin<Box<dyn Stream<Item = Result<T, Status>> + Send>>;

/// Pushes records down one open service-to-adapter stream. Dropping it ends
/// the stream cleanly.
pub type Feed<T> = mpsc::UnboundedSender<Result<T, Status>>;

/// A stand-in for the trip logic service.
///
/// Every time the adapter opens a stream, the test gets a handle to it: the
/// inbound records for `ReserveTrip`, or a [`Feed`] for the service kinds.
#[derive(Clone)]
struct MockLogic {
    reserve_trip: mpsc::UnboundedSender<Streaming<proto::ReserveTripMessage>>,
    ack: mpsc::UnboundedSender<Feed<proto::AckMessage>>,
    boat_status: mpsc::UnboundedSender<Feed<proto::BoatStatusMessage>>,
    arrived: mpsc::UnboundedSender<Feed<proto::ArrivedMessage>>,
}

pub struct LogicHandles {
    pub addr: SocketAddr,
    pub reserve_trip: mpsc::UnboundedReceiver<Streaming<proto::ReserveTripMessage>>,
    pub ack: mpsc::UnboundedReceiver<Feed<proto::AckMessage>>,
    pub boat_status: mpsc::UnboundedReceiver<Feed<proto::BoatStatusMessage>>,
    pub arrived: mpsc::UnboundedReceiver<Feed<proto::ArrivedMessage>>,
}

impl LogicHandles {
    pub fn endpoint(&self) -> String {
        format!("http://{}", self.addr)
    }
}

fn never<T: Send + 'static>() -> ResponseStream<T> {
    Box::pin(futures::stream::pending())
}

fn feed<T: Send + 'static>(opened: &mpsc::UnboundedSender<Feed<T>>) -> ResponseStream<T> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _ = opened.send(tx);
    Box::pin(async_stream::stream! {
        while let Some(item) = rx.recv().await {
            yield item;
        }
    })
}

fn drain<T: Send + 'static>(mut inbound: Streaming<T>) {
    tokio::spawn(async move { while let Some(Ok(_)) = inbound.next().await {} });
}

#[tonic::async_trait]
impl TripLogic for MockLogic {
    type ReserveTripStream = ResponseStream<proto::Empty>;
    type AtDockStream = ResponseStream<proto::Empty>;
    type OnBoatStream = ResponseStream<proto::Empty>;
    type OffBoatStream = ResponseStream<proto::Empty>;
    type AckStream = ResponseStream<proto::AckMessage>;
    type BoatStatusStream = ResponseStream<proto::BoatStatusMessage>;
    type ArrivedStream = ResponseStream<proto::ArrivedMessage>;

    async fn reserve_trip(
        &self,
        request: Request<Streaming<proto::ReserveTripMessage>>,
    ) -> Result<Response<Self::ReserveTripStream>, Status> {
        let _ = self.reserve_trip.send(request.into_inner());
        Ok(Response::new(never()))
    }

    async fn at_dock(
        &self,
        request: Request<Streaming<proto::AtDockMessage>>,
    ) -> Result<Response<Self::AtDockStream>, Status> {
        drain(request.into_inner());
        Ok(Response::new(never()))
    }

    async fn on_boat(
        &self,
        request: Request<Streaming<proto::OnBoatMessage>>,
    ) -> Result<Response<Self::OnBoatStream>, Status> {
        drain(request.into_inner());
        Ok(Response::new(never()))
    }

    async fn off_boat(
        &self,
        request: Request<Streaming<proto::OffBoatMessage>>,
    ) -> Result<Response<Self::OffBoatStream>, Status> {
        drain(request.into_inner());
        Ok(Response::new(never()))
    }

    async fn ack(
        &self,
        _request: Request<Streaming<proto::Empty>>,
    ) -> Result<Response<Self::AckStream>, Status> {
        Ok(Response::new(feed(&self.ack)))
    }

    async fn boat_status(
        &self,
        _request: Request<Streaming<proto::Empty>>,
    ) -> Result<Response<Self::BoatStatusStream>, Status> {
        Ok(Response::new(feed(&self.boat_status)))
    }

    async fn arrived(
        &self,
        _request: Request<Streaming<proto::Empty>>,
    ) -> Result<Response<Self::ArrivedStream>, Status> {
        Ok(Response::new(feed(&self.arrived)))
    }
}

/// Serve a mock logic service on an ephemeral port.
pub async fn start_logic() -> LogicHandles {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (reserve_trip_tx, reserve_trip) = mpsc::unbounded_channel();
    let (ack_tx, ack) = mpsc::unbounded_channel();
    let (boat_status_tx, boat_status) = mpsc::unbounded_channel();
    let (arrived_tx, arrived) = mpsc::unbounded_channel();
    let mock = MockLogic {
        reserve_trip: reserve_trip_tx,
        ack: ack_tx,
        boat_status: boat_status_tx,
        arrived: arrived_tx,
    };

    let incoming = Box::pin(async_stream::stream! {
        loop {
            yield listener.accept().await.map(|(stream, _)| stream);
        }
    });
    tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(TripLogicServer::new(mock))
            .serve_with_incoming(incoming)
            .await
            .unwrap();
    });

    LogicHandles {
        addr,
        reserve_trip,
        ack,
        boat_status,
        arrived,
    }
}

pub struct GatewayHandle {
    pub addr: SocketAddr,
    pub registry: Arc<riden_gateway::ClientRegistry>,
    pub control: Arc<riden_gateway::ControlSlot>,
}

impl GatewayHandle {
    pub fn adapter_url(&self) -> String {
        format!("ws://{}{}", self.addr, riden_gateway::ADAPTER_PATH)
    }

    pub fn client_url(&self) -> String {
        format!("ws://{}{}", self.addr, riden_gateway::CLIENT_PATH)
    }
}

/// Serve the real gateway on an ephemeral port.
pub async fn start_gateway() -> GatewayHandle {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let gateway = Gateway::new(GatewayConfig::default());
    let registry = Arc::clone(gateway.registry());
    let control = Arc::clone(gateway.control());
    tokio::spawn(gateway.serve(listener));
    GatewayHandle {
        addr,
        registry,
        control,
    }
}

/// Poll `condition` until it holds, or panic after [`TEST_TIMEOUT`].
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(TEST_TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

pub async fn within<F: std::future::Future>(future: F) -> F::Output {
    tokio::time::timeout(TEST_TIMEOUT, future)
        .await
        .expect("timed out")
}

pub fn proto_dock(number: i32, street: &str, gangway: &str) -> proto::Dock {
    proto::Dock {
        address: Some(proto::Address {
            number,
            street: street.to_string(),
        }),
        gangway: gangway.to_string(),
    }
}

pub fn proto_boat() -> proto::Boat {
    proto::Boat {
        boat_id: 911,
        name: "testBoat".to_string(),
    }
}

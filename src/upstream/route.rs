use riden_gateway::Envelope;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tonic::Status;
use tonic::Streaming;
use tonic::transport::Channel;
use tracing::{debug, info, warn};

use crate::downstream::OutboundPort;
use crate::error::DeliverError;
use crate::message::{ApiMessage, MessageKind, Routed, decode_payload, encode_payload};
use crate::proto;
use crate::proto::trip_logic_client::TripLogicClient;
use crate::relay::{DeliveryStats, RelayItem, RelayTable};
use crate::translate::resolve_target;
use crate::tripwire::Tripwire;

pub type LogicClient = TripLogicClient<Channel>;

/// The request side of an RPC stream, as handed to a connector.
///
/// This is a concrete type rather than a boxed trait object so the generated
/// client futures stay `Send`.
pub type RequestStream<T> = ReceiverStream<T>;

/// A function that opens one RPC stream on the logic service.
///
/// The connector receives a clone of the shared client and the request stream
/// to send, and returns the response stream.
pub type ConnectorFn<Req, Resp> = Arc<
    dyn Fn(
            LogicClient,
            RequestStream<Req>,
        ) -> Pin<Box<dyn Future<Output = Result<Streaming<Resp>, Status>> + Send>>
        + Send
        + Sync
        + 'static,
>;

/// Helper to create a boxed connector from an async closure.
pub fn make_connector<Req, Resp, F, Fut>(f: F) -> ConnectorFn<Req, Resp>
where
    F: Fn(LogicClient, RequestStream<Req>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Streaming<Resp>, Status>> + Send + 'static,
{
    Arc::new(move |client, requests| Box::pin(f(client, requests)))
}

/// Why a stream in the set stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFault {
    pub kind: MessageKind,
    pub reason: FaultReason,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultReason {
    /// The logic service ended the stream cleanly.
    Ended,
    /// The stream could not be opened, or failed while open.
    Failed(String),
}

impl StreamFault {
    fn ended(kind: MessageKind) -> Self {
        Self {
            kind,
            reason: FaultReason::Ended,
        }
    }

    fn failed(kind: MessageKind, cause: impl fmt::Display) -> Self {
        Self {
            kind,
            reason: FaultReason::Failed(cause.to_string()),
        }
    }
}

impl fmt::Display for StreamFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            FaultReason::Ended => write!(f, "{} stream ended", self.kind),
            FaultReason::Failed(cause) => write!(f, "{} stream failed: {cause}", self.kind),
        }
    }
}

/// What every route task in one generation of the stream set shares.
#[derive(Clone)]
pub struct RouteContext {
    pub relays: Arc<RelayTable>,
    pub outbound: Arc<OutboundPort>,
    pub stats: Arc<DeliveryStats>,
    /// Fired by the supervisor to stop every task in the generation.
    pub cancel: Tripwire<()>,
    /// Fired by the first task whose stream stops.
    pub fault: Tripwire<StreamFault>,
    pub relay_capacity: usize,
}

impl RouteContext {
    /// Report a stopped stream. Only the first report in a generation counts.
    fn report(&self, fault: StreamFault) {
        if self.fault.trip(fault.clone()) {
            debug!(fault = %fault, "Stream fault reported");
        }
    }
}

/// A route of any kind, stored by the route table.
pub(crate) trait ErasedRoute: Send + Sync {
    fn kind(&self) -> MessageKind;

    /// Spawn the task that drives this route's stream for one generation.
    fn spawn_route(&self, client: LogicClient, ctx: RouteContext) -> JoinHandle<()>;
}

/// Relays client messages of one kind to the logic service.
pub(crate) struct UplinkRoute<Api, Req> {
    connector: ConnectorFn<Req, proto::Empty>,
    _marker: PhantomData<fn(Api) -> Req>,
}

impl<Api, Req> UplinkRoute<Api, Req> {
    pub fn new(connector: ConnectorFn<Req, proto::Empty>) -> Self {
        Self {
            connector,
            _marker: PhantomData,
        }
    }
}

impl<Api, Req> ErasedRoute for UplinkRoute<Api, Req>
where
    Api: ApiMessage,
    Req: From<Routed<Api>> + Send + 'static,
{
    fn kind(&self) -> MessageKind {
        Api::KIND
    }

    fn spawn_route(&self, client: LogicClient, ctx: RouteContext) -> JoinHandle<()> {
        let kind = Api::KIND;
        let connector = Arc::clone(&self.connector);

        // Install before spawning so the channel exists as soon as the
        // generation starts.
        let (relay_tx, mut relay_rx) = mpsc::channel::<RelayItem>(ctx.relay_capacity);
        ctx.relays.install(kind, relay_tx);

        tokio::spawn(async move {
            let (wire_tx, wire_rx) = mpsc::channel::<Req>(ctx.relay_capacity);
            let requests = RequestStream::new(wire_rx);

            let mut responses = tokio::select! {
                _ = ctx.cancel.tripped() => return,
                opened = connector(client, requests) => match opened {
                    Ok(responses) => responses,
                    Err(status) => {
                        warn!(kind = %kind, error = %status, "Failed to open stream");
                        ctx.report(StreamFault::failed(kind, status));
                        return;
                    }
                },
            };
            info!(kind = %kind, "Uplink stream open");

            loop {
                tokio::select! {
                    _ = ctx.cancel.tripped() => break,
                    item = relay_rx.recv() => {
                        // The table was cleared; cancel is on its way.
                        let Some(item) = item else { break };
                        let message: Api = match decode_payload(&item.payload) {
                            Ok(message) => message,
                            Err(e) => {
                                warn!(
                                    kind = %kind,
                                    conn = %item.client.conn_name,
                                    error = %e,
                                    payload = ?item.payload,
                                    "Dropping undecodable message"
                                );
                                continue;
                            }
                        };

                        let conn = item.client.conn_name.clone();
                        match wire_tx.try_send(Req::from(Routed::new(item.client, message))) {
                            Ok(()) => debug!(kind = %kind, conn = %conn, "Sent to logic service"),
                            Err(TrySendError::Full(_)) => {
                                ctx.stats.record_upstream_drop(kind);
                                warn!(kind = %kind, conn = %conn, "Stream backed up, dropping message");
                            }
                            Err(TrySendError::Closed(_)) => {
                                warn!(kind = %kind, "Request stream closed");
                                ctx.report(StreamFault::failed(kind, "request stream closed"));
                                break;
                            }
                        }
                    }
                    response = responses.message() => match response {
                        Ok(Some(_)) => {}
                        Ok(None) => {
                            info!(kind = %kind, "Logic service ended stream");
                            ctx.report(StreamFault::ended(kind));
                            break;
                        }
                        Err(status) => {
                            warn!(kind = %kind, error = %status, "Stream failed");
                            ctx.report(StreamFault::failed(kind, status));
                            break;
                        }
                    },
                }
            }
            debug!(kind = %kind, "Uplink route stopped");
        })
    }
}

/// Delivers service messages of one kind to the gateway.
pub(crate) struct DownlinkRoute<Resp, Api> {
    connector: ConnectorFn<proto::Empty, Resp>,
    _marker: PhantomData<fn(Resp) -> Api>,
}

impl<Resp, Api> DownlinkRoute<Resp, Api> {
    pub fn new(connector: ConnectorFn<proto::Empty, Resp>) -> Self {
        Self {
            connector,
            _marker: PhantomData,
        }
    }
}

impl<Resp, Api> ErasedRoute for DownlinkRoute<Resp, Api>
where
    Resp: Send + 'static,
    Api: ApiMessage,
    Routed<Api>: From<Resp>,
{
    fn kind(&self) -> MessageKind {
        Api::KIND
    }

    fn spawn_route(&self, client: LogicClient, ctx: RouteContext) -> JoinHandle<()> {
        let kind = Api::KIND;
        let connector = Arc::clone(&self.connector);

        tokio::spawn(async move {
            // Nothing is ever sent on a downlink stream. The sender is held
            // for the life of the task so the request side stays open.
            let (_idle, idle_rx) = mpsc::channel::<proto::Empty>(1);
            let requests = RequestStream::new(idle_rx);

            let mut responses = tokio::select! {
                _ = ctx.cancel.tripped() => return,
                opened = connector(client, requests) => match opened {
                    Ok(responses) => responses,
                    Err(status) => {
                        warn!(kind = %kind, error = %status, "Failed to open stream");
                        ctx.report(StreamFault::failed(kind, status));
                        return;
                    }
                },
            };
            info!(kind = %kind, "Downlink stream open");

            loop {
                let response = tokio::select! {
                    _ = ctx.cancel.tripped() => break,
                    response = responses.message() => response,
                };
                match response {
                    Ok(Some(record)) => {
                        if let Err(e) = deliver(kind, Routed::<Api>::from(record), &ctx.outbound) {
                            warn!(kind = %kind, error = %e, "Dropping message for clients");
                        }
                    }
                    Ok(None) => {
                        info!(kind = %kind, "Logic service ended stream");
                        ctx.report(StreamFault::ended(kind));
                        break;
                    }
                    Err(status) => {
                        warn!(kind = %kind, error = %status, "Stream failed");
                        ctx.report(StreamFault::failed(kind, status));
                        break;
                    }
                }
            }
            debug!(kind = %kind, "Downlink route stopped");
        })
    }
}

/// Encode a service message and queue it for the gateway, addressed by its
/// routing metadata.
pub(crate) fn deliver<Api: ApiMessage>(
    kind: MessageKind,
    routed: Routed<Api>,
    outbound: &OutboundPort,
) -> Result<(), DeliverError> {
    let target = resolve_target(&routed.client)?;
    let payload = encode_payload(&routed.message)?;
    debug!(kind = %kind, conn = %target, "Queueing message for gateway");
    outbound.dispatch(kind, Envelope::new(target, payload))?;
    Ok(())
}

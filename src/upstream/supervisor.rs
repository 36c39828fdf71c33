use std::sync::Arc;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::config::AdapterConfig;
use crate::downstream::OutboundPort;
use crate::relay::{DeliveryStats, RelayTable};
use crate::tripwire::Tripwire;
use crate::upstream::route::{FaultReason, LogicClient, RouteContext, StreamFault};
use crate::upstream::routes::RouteTable;

/// Owns the connection to the logic service and every stream on it.
///
/// The streams live and die together. When any one of them stops, the whole
/// set is cancelled, the relay channels are removed, the connection is
/// dropped, and after a short delay everything is opened again from scratch.
pub struct StreamSetSupervisor {
    config: Arc<AdapterConfig>,
    routes: RouteTable,
    relays: Arc<RelayTable>,
    outbound: Arc<OutboundPort>,
    stats: Arc<DeliveryStats>,
}

impl StreamSetSupervisor {
    pub fn new(
        config: Arc<AdapterConfig>,
        routes: RouteTable,
        relays: Arc<RelayTable>,
        outbound: Arc<OutboundPort>,
        stats: Arc<DeliveryStats>,
    ) -> Self {
        Self {
            config,
            routes,
            relays,
            outbound,
            stats,
        }
    }

    /// Keep a stream set open until `shutdown` fires.
    pub async fn run(self, shutdown: Tripwire<()>) {
        let endpoint = self.config.logic_endpoint.clone();

        loop {
            let connected = tokio::select! {
                _ = shutdown.tripped() => break,
                connected = LogicClient::connect(endpoint.clone()) => connected,
            };

            let client = match connected {
                Ok(client) => client,
                Err(e) => {
                    warn!(%endpoint, error = %e, "Failed to connect to logic service, retrying");
                    tokio::select! {
                        _ = shutdown.tripped() => break,
                        _ = sleep(self.config.dial_retry_delay) => continue,
                    }
                }
            };
            info!(%endpoint, "Connected to logic service");

            let Some(fault) = self.run_generation(client, &shutdown).await else {
                break;
            };
            match fault.reason {
                FaultReason::Ended => info!(fault = %fault, "Restarting stream set"),
                FaultReason::Failed(_) => error!(fault = %fault, "Restarting stream set"),
            }
            self.stats.record_stream_restart();

            tokio::select! {
                _ = shutdown.tripped() => break,
                _ = sleep(self.config.stream_restart_delay) => {}
            }
        }
        info!("Stream set supervisor stopped");
    }

    /// Open every stream on `client` and wait for the first one to stop.
    ///
    /// Returns the fault that ended the generation, or `None` on shutdown.
    /// Either way, every task has finished and the relay channels are gone
    /// by the time this returns.
    pub(crate) async fn run_generation(
        &self,
        client: LogicClient,
        shutdown: &Tripwire<()>,
    ) -> Option<StreamFault> {
        let ctx = RouteContext {
            relays: Arc::clone(&self.relays),
            outbound: Arc::clone(&self.outbound),
            stats: Arc::clone(&self.stats),
            cancel: Tripwire::new(),
            fault: Tripwire::new(),
            relay_capacity: self.config.relay_capacity,
        };

        let tasks: Vec<_> = self
            .routes
            .iter()
            .map(|route| route.spawn_route(client.clone(), ctx.clone()))
            .collect();
        drop(client);

        let outcome = tokio::select! {
            fault = ctx.fault.tripped() => Some(fault),
            _ = shutdown.tripped() => None,
        };

        ctx.cancel.trip(());
        self.relays.clear();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Stream route task panicked");
            }
        }
        outcome
    }
}

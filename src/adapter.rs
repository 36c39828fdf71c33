use std::sync::Arc;
use tracing::{info, warn};

use crate::config::AdapterConfig;
use crate::downstream::{DownstreamLink, OutboundPort};
use crate::error::AdapterError;
use crate::relay::{DeliveryStats, RelayTable};
use crate::tripwire::Tripwire;
use crate::upstream::{RouteTable, StreamSetSupervisor};

/// Bridges the gateway's WebSocket link and the logic service's RPC streams.
///
/// The two sides are supervised independently: either may drop and reconnect
/// without disturbing the other. They meet only at the relay table (client
/// messages on their way to the logic service) and the outbound port (service
/// messages on their way to clients).
pub struct Adapter {
    config: Arc<AdapterConfig>,
    routes: RouteTable,
    relays: Arc<RelayTable>,
    outbound: Arc<OutboundPort>,
    stats: Arc<DeliveryStats>,
}

impl Adapter {
    /// An adapter with a stream for every message kind.
    pub fn new(config: AdapterConfig) -> Result<Self, AdapterError> {
        Self::with_routes(config, RouteTable::standard())
    }

    pub fn with_routes(config: AdapterConfig, routes: RouteTable) -> Result<Self, AdapterError> {
        config.validate()?;
        let stats = Arc::new(DeliveryStats::new());
        Ok(Self {
            config: Arc::new(config),
            routes,
            relays: Arc::new(RelayTable::new(Arc::clone(&stats))),
            outbound: Arc::new(OutboundPort::new(Arc::clone(&stats))),
            stats,
        })
    }

    pub fn stats(&self) -> &Arc<DeliveryStats> {
        &self.stats
    }

    /// Run both sides until `shutdown` fires.
    ///
    /// Returns an error if the gateway link gives up. In that case `shutdown`
    /// is fired too, so the upstream side stops with it.
    pub async fn run(self, shutdown: Tripwire<()>) -> Result<(), AdapterError> {
        info!(
            gateway = %self.config.gateway_url,
            logic = %self.config.logic_endpoint,
            "Adapter starting"
        );

        let upstream = StreamSetSupervisor::new(
            Arc::clone(&self.config),
            self.routes,
            Arc::clone(&self.relays),
            Arc::clone(&self.outbound),
            Arc::clone(&self.stats),
        );
        let upstream = tokio::spawn(upstream.run(shutdown.clone()));

        let link = DownstreamLink::new(
            Arc::clone(&self.config),
            Arc::clone(&self.relays),
            Arc::clone(&self.outbound),
            Arc::clone(&self.stats),
        );
        let result = link.run(shutdown.clone()).await;

        shutdown.trip(());
        if let Err(e) = upstream.await {
            warn!(error = %e, "Stream set supervisor panicked");
        }
        info!(stats = ?self.stats, "Adapter stopped");

        result.map_err(AdapterError::from)
    }
}

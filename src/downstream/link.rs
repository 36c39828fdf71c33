use futures::StreamExt;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{Notify, mpsc};
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::{WebSocketStream, connect_async};
use tracing::{error, info, warn};

use crate::config::AdapterConfig;
use crate::downstream::outbound::OutboundPort;
use crate::downstream::read_loop::ReadLoop;
use crate::downstream::write_loop::WriteLoop;
use crate::error::LinkError;
use crate::relay::{DeliveryStats, RelayTable};
use crate::retry::{is_retry_code_match, validate_patterns};
use crate::tripwire::Tripwire;

/// Capacity of the queue the read loop uses to hand control frames to the
/// write loop.
const CONTROL_QUEUE_CAPACITY: usize = 8;

/// Why a gateway session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// The adapter is shutting down.
    Shutdown,
    /// The gateway closed the connection.
    PeerClosed,
    /// Reading from the gateway failed.
    ReadFailed(String),
    /// A ping went unanswered for too long.
    KeepAliveExpired,
}

/// Keeps the adapter connected to the gateway.
///
/// Dials, runs one session at a time, and redials after a fixed delay when a
/// session ends or a dial fails. Each session gets a fresh write queue and
/// close signal; nothing carries over from the previous one.
pub struct DownstreamLink {
    config: Arc<AdapterConfig>,
    relays: Arc<RelayTable>,
    outbound: Arc<OutboundPort>,
    stats: Arc<DeliveryStats>,
}

impl DownstreamLink {
    pub fn new(
        config: Arc<AdapterConfig>,
        relays: Arc<RelayTable>,
        outbound: Arc<OutboundPort>,
        stats: Arc<DeliveryStats>,
    ) -> Self {
        Self {
            config,
            relays,
            outbound,
            stats,
        }
    }

    /// Run until `shutdown` fires, or until the gateway refuses the upgrade
    /// with a status the retry policy does not cover.
    pub async fn run(self, shutdown: Tripwire<()>) -> Result<(), LinkError> {
        validate_patterns(&self.config.retry_codes)?;
        let url = self.config.gateway_url.as_str();

        loop {
            let dialed = tokio::select! {
                _ = shutdown.tripped() => return Ok(()),
                dialed = connect_async(url) => dialed,
            };

            match dialed {
                Ok((ws, _)) => {
                    info!(%url, "Connected to gateway");
                    let end = self.run_session(ws, &shutdown).await;
                    if end == SessionEnd::Shutdown {
                        info!("Gateway link shut down");
                        return Ok(());
                    }
                    self.stats.record_link_reconnect();
                    warn!(reason = ?end, "Gateway session ended, reconnecting");
                }
                Err(WsError::Http(response)) => {
                    let status = response.status().as_u16();
                    if !is_retry_code_match(status, &self.config.retry_codes)? {
                        error!(status, "Gateway refused connection, giving up");
                        return Err(LinkError::Abandoned { status });
                    }
                    warn!(status, "Gateway refused connection, retrying");
                }
                Err(e) => {
                    warn!(%url, error = %e, "Failed to dial gateway, retrying");
                }
            }

            tokio::select! {
                _ = shutdown.tripped() => return Ok(()),
                _ = tokio::time::sleep(self.config.dial_retry_delay) => {}
            }
        }
    }

    /// Run one connected session to completion.
    ///
    /// The session ends at the first of: a read failure, the gateway closing,
    /// the keep-alive expiring, or shutdown. Teardown detaches the write queue
    /// so routers stop queueing to it, then waits for both loops.
    pub(crate) async fn run_session<T>(
        &self,
        ws: WebSocketStream<T>,
        shutdown: &Tripwire<()>,
    ) -> SessionEnd
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (sink, stream) = ws.split();
        let close = Tripwire::new();
        let pong = Arc::new(Notify::new());
        let (outbound_tx, outbound_rx) = mpsc::channel(self.config.outbound_capacity);
        let (control_tx, control_rx) = mpsc::channel(CONTROL_QUEUE_CAPACITY);

        self.outbound.attach(outbound_tx);

        let reader = tokio::spawn(
            ReadLoop {
                stream,
                relays: Arc::clone(&self.relays),
                control: control_tx,
                pong: Arc::clone(&pong),
                close: close.clone(),
            }
            .run(),
        );
        let writer = tokio::spawn(
            WriteLoop {
                sink,
                outbound: outbound_rx,
                control: control_rx,
                pong,
                close: close.clone(),
                keep_alive_period: self.config.keep_alive_period,
                keep_alive_expiry: self.config.keep_alive_expiry(),
                close_write_timeout: self.config.close_write_timeout,
            }
            .run(),
        );

        tokio::select! {
            _ = shutdown.tripped() => {
                close.trip(SessionEnd::Shutdown);
            }
            _ = close.tripped() => {}
        }
        let end = close.tripped().await;

        self.outbound.detach();
        for (name, task) in [("read", reader), ("write", writer)] {
            if let Err(e) = task.await {
                warn!(task = name, error = %e, "Gateway loop panicked");
            }
        }
        end
    }
}

use bytes::Bytes;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::error::DispatchError;
use crate::message::{ClientData, MessageKind};

/// A client message on its way to the logic service.
///
/// Only the kind has been read from the payload; the router for that kind
/// decodes the rest.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayItem {
    pub client: ClientData,
    pub payload: Bytes,
}

/// Drop and restart counters.
///
/// Delivery is at most once: a full or missing queue drops the message rather
/// than stall the loop producing it. Every such drop is counted here per kind.
#[derive(Default)]
pub struct DeliveryStats {
    relay_dropped: [AtomicU64; MessageKind::COUNT],
    upstream_dropped: [AtomicU64; MessageKind::COUNT],
    outbound_dropped: [AtomicU64; MessageKind::COUNT],
    link_reconnects: AtomicU64,
    stream_restarts: AtomicU64,
}

impl DeliveryStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// A client message could not be placed on its relay channel.
    pub fn record_relay_drop(&self, kind: MessageKind) {
        self.relay_dropped[kind.index()].fetch_add(1, Ordering::Relaxed);
    }

    /// A translated message could not be placed on its RPC stream.
    pub fn record_upstream_drop(&self, kind: MessageKind) {
        self.upstream_dropped[kind.index()].fetch_add(1, Ordering::Relaxed);
    }

    /// A service message could not be placed on the gateway write queue.
    pub fn record_outbound_drop(&self, kind: MessageKind) {
        self.outbound_dropped[kind.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_link_reconnect(&self) {
        self.link_reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stream_restart(&self) {
        self.stream_restarts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn relay_drops(&self, kind: MessageKind) -> u64 {
        self.relay_dropped[kind.index()].load(Ordering::Relaxed)
    }

    pub fn upstream_drops(&self, kind: MessageKind) -> u64 {
        self.upstream_dropped[kind.index()].load(Ordering::Relaxed)
    }

    pub fn outbound_drops(&self, kind: MessageKind) -> u64 {
        self.outbound_dropped[kind.index()].load(Ordering::Relaxed)
    }

    pub fn link_reconnects(&self) -> u64 {
        self.link_reconnects.load(Ordering::Relaxed)
    }

    pub fn stream_restarts(&self) -> u64 {
        self.stream_restarts.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for DeliveryStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let per_kind = |read: fn(&Self, MessageKind) -> u64| {
            MessageKind::ALL
                .into_iter()
                .map(|kind| (kind.as_str(), read(self, kind)))
                .filter(|(_, n)| *n > 0)
                .collect::<Vec<_>>()
        };
        f.debug_struct("DeliveryStats")
            .field("relay_dropped", &per_kind(Self::relay_drops))
            .field("upstream_dropped", &per_kind(Self::upstream_drops))
            .field("outbound_dropped", &per_kind(Self::outbound_drops))
            .field("link_reconnects", &self.link_reconnects())
            .field("stream_restarts", &self.stream_restarts())
            .finish()
    }
}

/// The current relay channel for each client-originated kind.
///
/// The upstream supervisor installs a fresh sender per kind each time it
/// rebuilds the stream set and clears them all on teardown, while the gateway
/// read loop dispatches into whatever is installed. Lookups and swaps happen
/// from different tasks, so the senders live in a concurrent map.
pub struct RelayTable {
    senders: DashMap<MessageKind, mpsc::Sender<RelayItem>, ahash::RandomState>,
    stats: Arc<DeliveryStats>,
}

impl RelayTable {
    pub fn new(stats: Arc<DeliveryStats>) -> Self {
        Self {
            senders: DashMap::default(),
            stats,
        }
    }

    /// Install the sender for a kind, replacing any previous one.
    pub fn install(&self, kind: MessageKind, sender: mpsc::Sender<RelayItem>) {
        self.senders.insert(kind, sender);
    }

    /// Remove every sender. Routers see their channel close once the last
    /// in-flight dispatch finishes.
    pub fn clear(&self) {
        self.senders.clear();
    }

    pub fn is_installed(&self, kind: MessageKind) -> bool {
        self.senders.contains_key(&kind)
    }

    /// Place an item on the relay channel for `kind` without waiting.
    ///
    /// On failure the item is dropped and the drop is counted.
    pub fn dispatch(&self, kind: MessageKind, item: RelayItem) -> Result<(), DispatchError> {
        let result = match self.senders.get(&kind) {
            None => Err(DispatchError::NoChannel(kind)),
            Some(sender) => sender.try_send(item).map_err(|e| match e {
                TrySendError::Full(_) => DispatchError::Full(kind),
                TrySendError::Closed(_) => DispatchError::Closed(kind),
            }),
        };
        if result.is_err() {
            self.stats.record_relay_drop(kind);
        }
        result
    }

    pub fn stats(&self) -> &Arc<DeliveryStats> {
        &self.stats
    }
}

impl fmt::Debug for RelayTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let installed: Vec<_> = self.senders.iter().map(|entry| *entry.key()).collect();
        f.debug_struct("RelayTable")
            .field("installed", &installed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn item(name: &str) -> RelayItem {
        RelayItem {
            client: ClientData::websocket(name),
            payload: Bytes::from_static(br#"{"MessageType":"reserveTrip"}"#),
        }
    }

    #[tokio::test]
    async fn test_full_channel_drops_without_blocking() {
        let table = RelayTable::new(Arc::new(DeliveryStats::new()));
        let (tx, mut rx) = mpsc::channel(1);
        table.install(MessageKind::ReserveTrip, tx);

        table.dispatch(MessageKind::ReserveTrip, item("a")).unwrap();

        let second = tokio::time::timeout(Duration::from_millis(100), async {
            table.dispatch(MessageKind::ReserveTrip, item("b"))
        })
        .await
        .expect("dispatch must not block");

        assert_eq!(second, Err(DispatchError::Full(MessageKind::ReserveTrip)));
        assert_eq!(table.stats().relay_drops(MessageKind::ReserveTrip), 1);
        assert_eq!(table.stats().relay_drops(MessageKind::AtDock), 0);

        assert_eq!(rx.recv().await.unwrap(), item("a"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_missing_channel_is_counted() {
        let table = RelayTable::new(Arc::new(DeliveryStats::new()));
        assert_eq!(
            table.dispatch(MessageKind::OnBoat, item("a")),
            Err(DispatchError::NoChannel(MessageKind::OnBoat))
        );
        assert_eq!(table.stats().relay_drops(MessageKind::OnBoat), 1);
    }

    #[test]
    fn test_clear_removes_all() {
        let table = RelayTable::new(Arc::new(DeliveryStats::new()));
        let (tx, rx) = mpsc::channel(1);
        table.install(MessageKind::AtDock, tx.clone());
        table.install(MessageKind::OffBoat, tx);
        drop(rx);

        assert_eq!(
            table.dispatch(MessageKind::AtDock, item("a")),
            Err(DispatchError::Closed(MessageKind::AtDock))
        );

        table.clear();
        assert!(!table.is_installed(MessageKind::AtDock));
        assert!(!table.is_installed(MessageKind::OffBoat));
    }

    #[test]
    fn test_fifo_within_kind() {
        let table = RelayTable::new(Arc::new(DeliveryStats::new()));
        let (tx, mut rx) = mpsc::channel(4);
        table.install(MessageKind::OnBoat, tx);

        for name in ["1", "2", "3"] {
            table.dispatch(MessageKind::OnBoat, item(name)).unwrap();
        }
        for name in ["1", "2", "3"] {
            assert_eq!(rx.try_recv().unwrap().client.conn_name, name);
        }
    }
}

use riden_gateway::Envelope;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};

use crate::error::DispatchError;
use crate::message::MessageKind;
use crate::relay::DeliveryStats;

/// Where service-originated messages go on their way to the gateway.
///
/// Routers hold the port for the life of the process; the link attaches the
/// write queue of each session when it connects and detaches it on teardown.
/// Anything dispatched while detached is dropped and counted.
pub struct OutboundPort {
    current: watch::Sender<Option<mpsc::Sender<Envelope>>>,
    stats: Arc<DeliveryStats>,
}

impl OutboundPort {
    pub fn new(stats: Arc<DeliveryStats>) -> Self {
        let (current, _) = watch::channel(None);
        Self { current, stats }
    }

    pub fn attach(&self, queue: mpsc::Sender<Envelope>) {
        self.current.send_replace(Some(queue));
    }

    pub fn detach(&self) {
        self.current.send_replace(None);
    }

    pub fn is_attached(&self) -> bool {
        self.current.borrow().is_some()
    }

    /// Queue an envelope for the gateway without waiting.
    pub fn dispatch(&self, kind: MessageKind, envelope: Envelope) -> Result<(), DispatchError> {
        let result = match self.current.borrow().as_ref() {
            None => Err(DispatchError::Detached(kind)),
            Some(queue) => queue.try_send(envelope).map_err(|e| match e {
                TrySendError::Full(_) => DispatchError::Full(kind),
                TrySendError::Closed(_) => DispatchError::Closed(kind),
            }),
        };
        if result.is_err() {
            self.stats.record_outbound_drop(kind);
        }
        result
    }
}

impl fmt::Debug for OutboundPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutboundPort")
            .field("attached", &self.is_attached())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detached_drops() {
        let port = OutboundPort::new(Arc::new(DeliveryStats::new()));
        assert_eq!(
            port.dispatch(MessageKind::Ack, Envelope::new("c", &b"{}"[..])),
            Err(DispatchError::Detached(MessageKind::Ack))
        );
        assert_eq!(port.stats.outbound_drops(MessageKind::Ack), 1);
    }

    #[test]
    fn test_attach_full_detach() {
        let port = OutboundPort::new(Arc::new(DeliveryStats::new()));
        let (tx, mut rx) = mpsc::channel(1);
        port.attach(tx);

        port.dispatch(MessageKind::Arrived, Envelope::new("a", &b"1"[..]))
            .unwrap();
        assert_eq!(
            port.dispatch(MessageKind::Arrived, Envelope::new("b", &b"2"[..])),
            Err(DispatchError::Full(MessageKind::Arrived))
        );
        assert_eq!(rx.try_recv().unwrap().client_conn_name, "a");

        port.detach();
        assert!(!port.is_attached());
        // Detaching drops the port's sender, which closes the session's queue.
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
        assert_eq!(port.stats.outbound_drops(MessageKind::Arrived), 1);
    }
}

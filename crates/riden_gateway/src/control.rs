use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::sync::mpsc::error::TrySendError;
use tokio_tungstenite::tungstenite::Message;

use crate::envelope::Envelope;
use crate::error::{ForwardError, GatewayError};

/// The write side of the adapter's control connection.
#[derive(Debug, Clone)]
pub struct ControlHandle {
    write: mpsc::Sender<Message>,
    remote: SocketAddr,
}

impl ControlHandle {
    pub fn new(write: mpsc::Sender<Message>, remote: SocketAddr) -> Self {
        Self { write, remote }
    }

    pub fn remote(&self) -> SocketAddr {
        self.remote
    }
}

/// Holds the one designated adapter connection.
///
/// At most one adapter may be connected at a time. Claiming the slot is a
/// single check-and-set on the watch cell, so two adapters racing through the
/// handshake cannot both win.
pub struct ControlSlot {
    current: watch::Sender<Option<ControlHandle>>,
}

impl ControlSlot {
    pub fn new() -> Self {
        let (current, _) = watch::channel(None);
        Self { current }
    }

    /// Take the slot. Returns a guard that frees it on drop.
    pub fn claim(self: &Arc<Self>, handle: ControlHandle) -> Result<ControlGuard, GatewayError> {
        let remote = handle.remote;
        let mut handle = Some(handle);
        let claimed = self.current.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = handle.take();
            true
        });

        if claimed {
            Ok(ControlGuard {
                slot: Arc::clone(self),
                remote,
            })
        } else {
            Err(GatewayError::ControlOccupied(
                self.remote().unwrap_or(remote),
            ))
        }
    }

    pub fn is_connected(&self) -> bool {
        self.current.borrow().is_some()
    }

    /// Remote address of the connected adapter, if any.
    pub fn remote(&self) -> Option<SocketAddr> {
        self.current.borrow().as_ref().map(ControlHandle::remote)
    }

    /// Queue an envelope for the adapter without waiting.
    pub fn forward(&self, envelope: &Envelope) -> Result<(), ForwardError> {
        let text = envelope.to_json()?;
        let current = self.current.borrow();
        let handle = current.as_ref().ok_or(ForwardError::NotConnected)?;
        handle
            .write
            .try_send(Message::Text(text))
            .map_err(|e| match e {
                TrySendError::Full(_) => ForwardError::QueueFull,
                TrySendError::Closed(_) => ForwardError::NotConnected,
            })
    }

    fn release(&self, remote: SocketAddr) {
        self.current.send_if_modified(|slot| {
            let ours = slot.as_ref().is_some_and(|handle| handle.remote == remote);
            if ours {
                *slot = None;
            }
            ours
        });
    }
}

impl Default for ControlSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ControlSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlSlot")
            .field("remote", &self.remote())
            .finish()
    }
}

/// Holds the claimed control slot. When dropped, the slot is freed.
#[derive(Debug)]
pub struct ControlGuard {
    slot: Arc<ControlSlot>,
    remote: SocketAddr,
}

impl Drop for ControlGuard {
    fn drop(&mut self) {
        self.slot.release(self.remote);
    }
}

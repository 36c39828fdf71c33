use bytes::Bytes;
use dashmap::DashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_tungstenite::tungstenite::Message;
use tracing::warn;

use crate::error::{DeliveryError, GatewayError};

/// The write side of one client connection.
///
/// The client's write loop owns the receiving half of `write`. Once the route is
/// removed from the registry and the read loop has finished, every sender is
/// gone and the write loop exits; dropping the route is the close signal.
#[derive(Debug, Clone)]
pub struct ClientRoute {
    write: mpsc::Sender<Message>,
    remote: SocketAddr,
}

impl ClientRoute {
    pub fn new(write: mpsc::Sender<Message>, remote: SocketAddr) -> Self {
        Self { write, remote }
    }

    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    fn try_deliver(&self, name: &str, frame: Message) -> Result<(), DeliveryError> {
        self.write.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::QueueFull(name.to_owned()),
            TrySendError::Closed(_) => DeliveryError::Closed(name.to_owned()),
        })
    }
}

/// Tracks connected clients by connection name.
///
/// Inserts, lookups, and removals come from many connection tasks at once, so
/// the routes live in a sharded concurrent map rather than behind one lock.
/// Registering returns a guard that removes the route when dropped.
#[derive(Debug)]
pub struct ClientRegistry {
    routes: DashMap<String, ClientRoute, ahash::RandomState>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            routes: DashMap::default(),
        }
    }

    /// Register a client route. Returns a guard that removes it on drop.
    ///
    /// Returns an error if a route already exists under this name.
    pub fn register(
        self: &Arc<Self>,
        name: impl Into<String>,
        route: ClientRoute,
    ) -> Result<RouteGuard, GatewayError> {
        use dashmap::mapref::entry::Entry;

        let name = name.into();
        match self.routes.entry(name.clone()) {
            Entry::Occupied(_) => Err(GatewayError::DuplicateConnection(name)),
            Entry::Vacant(slot) => {
                slot.insert(route);
                Ok(RouteGuard {
                    name,
                    registry: Arc::clone(self),
                })
            }
        }
    }

    /// Queue a payload for a single client without waiting.
    pub fn unicast(&self, name: &str, payload: &Bytes) -> Result<(), DeliveryError> {
        let text = payload_text(payload)?;
        let route = self
            .routes
            .get(name)
            .ok_or_else(|| DeliveryError::UnknownClient(name.to_owned()))?;
        route.try_deliver(name, Message::Text(text))
    }

    /// Queue a payload for every connected client without waiting.
    ///
    /// Clients whose queue is full or closed miss this payload; the failures
    /// are logged and the rest still receive it. Returns the number of clients
    /// the payload was queued for.
    pub fn broadcast(&self, payload: &Bytes) -> Result<usize, DeliveryError> {
        let text = payload_text(payload)?;
        let mut delivered = 0;
        for entry in self.routes.iter() {
            match entry.value().try_deliver(entry.key(), Message::Text(text.clone())) {
                Ok(()) => delivered += 1,
                Err(e) => warn!(conn = %entry.key(), error = %e, "Dropped broadcast payload"),
            }
        }
        Ok(delivered)
    }

    /// Remove a route ahead of its guard, so nothing more is delivered to it.
    pub fn invalidate(&self, name: &str) -> bool {
        self.routes.remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.routes.contains_key(name)
    }

    /// Names of all registered clients.
    pub fn names(&self) -> Vec<String> {
        self.routes.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    fn remove(&self, name: &str) {
        self.routes.remove(name);
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn payload_text(payload: &Bytes) -> Result<String, DeliveryError> {
    String::from_utf8(payload.to_vec()).map_err(|_| DeliveryError::NotUtf8)
}

/// Holds a registered client route. When dropped, the route is removed.
pub struct RouteGuard {
    name: String,
    registry: Arc<ClientRegistry>,
}

impl RouteGuard {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for RouteGuard {
    fn drop(&mut self) {
        self.registry.remove(&self.name);
    }
}

impl fmt::Debug for RouteGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteGuard")
            .field("name", &self.name)
            .finish()
    }
}

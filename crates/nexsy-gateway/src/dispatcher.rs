use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, trace};

use nexsy_types::events::ServerEvent;

use crate::registry::{ConnectionId, PresenceRegistry, Registration};

/// Who an outbound event goes to.
#[derive(Debug, Clone, PartialEq)]
pub enum Audience {
    Connections(Vec<ConnectionId>),
    /// Every live connection, registered or not.
    Everyone,
}

/// One outbound event and its audience.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub audience: Audience,
    pub event: ServerEvent,
}

impl Delivery {
    pub fn to(connections: Vec<ConnectionId>, event: ServerEvent) -> Self {
        Self {
            audience: Audience::Connections(connections),
            event,
        }
    }

    /// Every live connection, registered or not.
    pub fn notify_all(event: ServerEvent) -> Self {
        Self {
            audience: Audience::Everyone,
            event,
        }
    }
}

/// Owns every live connection's outbound queue plus the presence registry,
/// and fans events out to them.
#[derive(Clone, Default)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

#[derive(Default)]
struct DispatcherInner {
    /// Per-connection outbound queues. Each connection's writer task drains
    /// its own queue, so events to one connection keep their order.
    outboxes: Mutex<HashMap<ConnectionId, mpsc::UnboundedSender<ServerEvent>>>,

    /// Identity <-> connection index
    registry: Mutex<PresenceRegistry>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn outboxes(&self) -> MutexGuard<'_, HashMap<ConnectionId, mpsc::UnboundedSender<ServerEvent>>> {
        self.inner.outboxes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn registry(&self) -> MutexGuard<'_, PresenceRegistry> {
        self.inner.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open an outbound queue for a new connection.
    pub fn attach(&self) -> (ConnectionId, mpsc::UnboundedReceiver<ServerEvent>) {
        let conn = ConnectionId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        self.outboxes().insert(conn, tx);
        (conn, rx)
    }

    /// Close a connection's queue and drop it from presence. Returns the
    /// identity if that was its last connection.
    pub fn detach(&self, conn: ConnectionId) -> Option<String> {
        self.outboxes().remove(&conn);
        self.registry().unregister(conn)
    }

    pub fn register(&self, conn: ConnectionId, identity: &str) -> Registration {
        self.registry().register(conn, identity)
    }

    pub fn identity_of(&self, conn: ConnectionId) -> Option<String> {
        self.registry().identity_of(conn).map(str::to_string)
    }

    pub fn connections_for(&self, identity: &str) -> Vec<ConnectionId> {
        self.registry().connections_for(identity)
    }

    pub fn online_identities(&self) -> Vec<String> {
        self.registry().online_identities()
    }

    pub fn connection_count(&self) -> usize {
        self.outboxes().len()
    }

    /// Send an event to specific connections. Unknown handles are skipped.
    pub fn send_to(&self, connections: &[ConnectionId], event: &ServerEvent) {
        let outboxes = self.outboxes();
        for conn in connections {
            if let Some(tx) = outboxes.get(conn) {
                let _ = tx.send(event.clone());
            }
        }
        trace!("{} -> {} connection(s)", event.name(), connections.len());
    }

    /// Send an event to every live connection.
    pub fn broadcast(&self, event: &ServerEvent) {
        let outboxes = self.outboxes();
        for tx in outboxes.values() {
            let _ = tx.send(event.clone());
        }
        debug!("{} broadcast to {} connection(s)", event.name(), outboxes.len());
    }

    pub fn deliver(&self, delivery: Delivery) {
        match &delivery.audience {
            Audience::Connections(conns) => self.send_to(conns, &delivery.event),
            Audience::Everyone => self.broadcast(&delivery.event),
        }
    }

    pub fn deliver_all(&self, deliveries: Vec<Delivery>) {
        for delivery in deliveries {
            self.deliver(delivery);
        }
    }
}

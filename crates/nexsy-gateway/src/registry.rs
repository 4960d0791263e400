use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use uuid::Uuid;

/// Opaque handle for one live duplex connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is enough to tell connections apart in logs.
        write!(f, "{}", &self.0.simple().to_string()[..8])
    }
}

/// What a `register` call changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registration {
    /// The identity had no connections before this one.
    pub came_online: bool,
    /// The connection was bound to a different identity, which lost its last
    /// connection by the move.
    pub displaced: Option<String>,
}

/// Bidirectional index between user identities and their live connections.
///
/// An identity is online iff it owns at least one connection. Every method is
/// synchronous and completes its mutation before returning.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    by_connection: HashMap<ConnectionId, String>,
    by_identity: HashMap<String, HashSet<ConnectionId>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `conn` to `identity`. Repeating the same binding is a no-op; binding
    /// to a new identity moves the connection.
    pub fn register(&mut self, conn: ConnectionId, identity: &str) -> Registration {
        let mut displaced = None;

        match self.by_connection.get(&conn).cloned() {
            Some(current) if current == identity => return Registration::default(),
            Some(_) => displaced = self.unregister(conn),
            None => {}
        }

        let set = self.by_identity.entry(identity.to_string()).or_default();
        let came_online = set.is_empty();
        set.insert(conn);
        self.by_connection.insert(conn, identity.to_string());

        Registration {
            came_online,
            displaced,
        }
    }

    /// Drop `conn`. Returns the identity if this was its last connection.
    pub fn unregister(&mut self, conn: ConnectionId) -> Option<String> {
        let identity = self.by_connection.remove(&conn)?;

        let set = self.by_identity.get_mut(&identity)?;
        set.remove(&conn);
        if set.is_empty() {
            self.by_identity.remove(&identity);
            return Some(identity);
        }
        None
    }

    pub fn identity_of(&self, conn: ConnectionId) -> Option<&str> {
        self.by_connection.get(&conn).map(String::as_str)
    }

    /// Empty if the identity is unknown or offline.
    pub fn connections_for(&self, identity: &str) -> Vec<ConnectionId> {
        self.by_identity
            .get(identity)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn is_online(&self, identity: &str) -> bool {
        self.by_identity.contains_key(identity)
    }

    /// Online identities, deduplicated and sorted.
    pub fn online_identities(&self) -> Vec<String> {
        self.by_identity
            .keys()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

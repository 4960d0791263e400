use chrono::Utc;
use tracing::{debug, error, info};

use nexsy_types::events::{ServerEvent, UserRef};

use crate::blocking::StoreHandle;
use crate::dispatcher::Dispatcher;
use crate::error::DeliveryError;
use crate::registry::ConnectionId;

/// Keeps clients' view of who is online (and when others were last seen) in
/// step with the presence registry and the users table.
#[derive(Clone)]
pub struct PresenceBroadcaster {
    store: StoreHandle,
    dispatcher: Dispatcher,
}

impl PresenceBroadcaster {
    pub fn new(store: StoreHandle, dispatcher: Dispatcher) -> Self {
        Self { store, dispatcher }
    }

    /// Bind a connection to an identity and announce it. The binding stands
    /// even if stamping the users table fails.
    pub async fn register(&self, conn: ConnectionId, req: UserRef) -> Result<(), DeliveryError> {
        let username = req.username.trim().to_string();
        if username.is_empty() {
            return Err(DeliveryError::Validation("Missing username"));
        }

        let registration = self.dispatcher.register(conn, &username);
        info!(
            "{} registered on connection {} (came online: {})",
            username, conn, registration.came_online
        );

        let at = Utc::now();
        let name = username.clone();
        if let Err(e) = self.store.call(move |store| store.set_presence(&name, true, at)).await {
            error!("Failed to stamp {} online: {:#}", username, e);
        }
        if let Some(previous) = registration.displaced {
            self.persist_offline(&previous).await;
        }

        self.publish_online();
        self.publish_roster().await;
        Ok(())
    }

    /// A connection closed. If it was the identity's last, record the offline
    /// transition and announce it.
    pub async fn disconnected(&self, conn: ConnectionId) {
        let Some(identity) = self.dispatcher.detach(conn) else {
            return;
        };
        info!("{} went offline", identity);
        self.persist_offline(&identity).await;
        self.publish_online();
        self.publish_roster().await;
    }

    /// Activity ping from a client: refresh last-seen and republish the roster.
    pub async fn touch(&self, req: UserRef) -> Result<(), DeliveryError> {
        let username = req.username.trim().to_string();
        if username.is_empty() {
            return Err(DeliveryError::Validation("Missing username"));
        }

        let at = Utc::now();
        self.store
            .call(move |store| store.touch_last_seen(&username, at))
            .await
            .map_err(DeliveryError::persistence("update last seen"))?;

        self.publish_roster().await;
        Ok(())
    }

    /// Snapshot of online identities for one connection (sent on connect).
    pub fn online_snapshot(&self) -> ServerEvent {
        ServerEvent::OnlineUsers(self.dispatcher.online_identities())
    }

    pub fn publish_online(&self) {
        self.dispatcher.broadcast(&self.online_snapshot());
    }

    /// Broadcast the full roster. A store failure skips this round; the next
    /// presence change publishes again.
    pub async fn publish_roster(&self) {
        match self.store.call(|store| store.list_users()).await {
            Ok(users) => self.dispatcher.broadcast(&ServerEvent::AllUsers(users)),
            Err(e) => error!("Failed to load user roster: {:#}", e),
        }
    }

    /// Stamp an identity offline unless it reconnected in the meantime. The
    /// registry is consulted under the store lock, which a registration's own
    /// online stamp also has to take, so that stamp is never overwritten.
    async fn persist_offline(&self, identity: &str) {
        let at = Utc::now();
        let name = identity.to_string();
        let dispatcher = self.dispatcher.clone();
        let stamped = self
            .store
            .call(move |store| {
                store.set_offline_unless(&name, at, &|| {
                    !dispatcher.connections_for(&name).is_empty()
                })
            })
            .await;
        match stamped {
            Ok(true) => {}
            Ok(false) => debug!("{} reconnected, keeping online stamp", identity),
            Err(e) => error!("Failed to stamp {} offline: {:#}", identity, e),
        }
    }
}

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use nexsy_db::MessageStore;
use nexsy_types::events::{ClientEvent, ServerEvent};

use crate::blocking::StoreHandle;
use crate::dispatcher::{Delivery, Dispatcher};
use crate::engine::DeliveryEngine;
use crate::error::DeliveryError;
use crate::presence::PresenceBroadcaster;
use crate::registry::ConnectionId;

/// Entry point for the transport: one instance per server, cloned into every
/// connection task. Turns inbound frames into engine and presence calls and
/// delivers what they produce.
#[derive(Clone)]
pub struct Hub {
    dispatcher: Dispatcher,
    engine: DeliveryEngine,
    presence: PresenceBroadcaster,
}

impl Hub {
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        let store = StoreHandle::new(store);
        let dispatcher = Dispatcher::new();
        Self {
            engine: DeliveryEngine::new(store.clone(), dispatcher.clone()),
            presence: PresenceBroadcaster::new(store, dispatcher.clone()),
            dispatcher,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn engine(&self) -> &DeliveryEngine {
        &self.engine
    }

    /// Open a connection. The new connection immediately gets the current
    /// online list so it can render presence before registering.
    pub fn connect(&self) -> (ConnectionId, mpsc::UnboundedReceiver<ServerEvent>) {
        let (conn, rx) = self.dispatcher.attach();
        self.dispatcher.send_to(&[conn], &self.presence.online_snapshot());
        (conn, rx)
    }

    /// Transport-level close.
    pub async fn disconnect(&self, conn: ConnectionId) {
        self.presence.disconnected(conn).await;
    }

    /// Handle one raw text frame. Frames that do not parse as a known event
    /// get an `error` back and are otherwise ignored.
    pub async fn handle_text(&self, origin: ConnectionId, text: &str) {
        match serde_json::from_str::<ClientEvent>(text) {
            Ok(event) => self.handle(origin, event).await,
            Err(e) => {
                warn!(
                    "Connection {} sent a bad event: {} -- raw: {}",
                    origin,
                    e,
                    truncate(text, 200)
                );
                self.dispatcher
                    .send_to(&[origin], &ServerEvent::error("Malformed event"));
            }
        }
    }

    /// Route one inbound event. Failures go back to `origin` only.
    pub async fn handle(&self, origin: ConnectionId, event: ClientEvent) {
        let name = event.name();
        debug!("Connection {} -> {}", origin, name);

        let result = match event {
            ClientEvent::RegisterUser(req) => self.presence.register(origin, req).await,
            ClientEvent::UpdateLastSeen(req) => self.presence.touch(req).await,
            ClientEvent::SendMessage(req) => self.deliver(self.engine.send(origin, req).await),
            ClientEvent::MarkMessagesSeen(req) => self.deliver(self.engine.mark_seen(req).await),
            ClientEvent::MessageDelivered(req) => {
                self.deliver(self.engine.mark_delivered(req).await)
            }
            ClientEvent::Typing(req) => self.deliver(self.engine.typing(req)),
            ClientEvent::DeleteMessage(req) => self.deliver(self.engine.delete(req).await),
        };

        if let Err(err) = result {
            match &err {
                DeliveryError::Persistence { .. } => {
                    error!("{} from connection {} failed: {}", name, origin, err)
                }
                _ => warn!("{} from connection {} rejected: {}", name, origin, err),
            }
            self.dispatcher
                .send_to(&[origin], &ServerEvent::error(err.client_message()));
        }
    }

    fn deliver(
        &self,
        planned: Result<Vec<Delivery>, DeliveryError>,
    ) -> Result<(), DeliveryError> {
        self.dispatcher.deliver_all(planned?);
        Ok(())
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    text.char_indices().nth(max_chars).map_or(text, |(i, _)| &text[..i])
}

//! Message delivery: the sent -> delivered -> seen lifecycle plus typing relay
//! and soft delete.
//!
//! Each operation validates its payload, persists the transition, and only
//! then returns the notifications to fan out. Nothing is emitted for a
//! transition that did not reach the store.

use chrono::Utc;
use tracing::{debug, error, info};

use nexsy_db::DeliveryOutcome;
use nexsy_types::events::{MessageRef, Participants, SendMessage};
use nexsy_types::models::Message;

use crate::blocking::StoreHandle;
use crate::dispatcher::{Delivery, Dispatcher};
use crate::error::DeliveryError;
use crate::registry::ConnectionId;

/// Pure mapping from a persisted state change to the notifications it causes.
pub mod plan {
    use nexsy_types::events::{
        MessageDeleted, NotificationHint, Participants, SeenReceipt, ServerEvent, StatusUpdate,
    };
    use nexsy_types::models::Message;
    use uuid::Uuid;

    use crate::dispatcher::Delivery;
    use crate::registry::ConnectionId;

    /// A new message: the receiver's connections get it (plus a sound hint),
    /// the sender's connections get the ack. The originating connection is
    /// always acked, even if it never registered.
    pub fn sent(
        message: &Message,
        origin: ConnectionId,
        mut sender_conns: Vec<ConnectionId>,
        receiver_conns: Vec<ConnectionId>,
    ) -> Vec<Delivery> {
        let mut out = Vec::with_capacity(3);

        if !receiver_conns.is_empty() {
            out.push(Delivery::to(
                receiver_conns.clone(),
                ServerEvent::ReceiveMessage(message.clone()),
            ));
            out.push(Delivery::to(
                receiver_conns,
                ServerEvent::PlayNotification(NotificationHint {
                    sender: message.sender.clone(),
                }),
            ));
        }

        if !sender_conns.contains(&origin) {
            sender_conns.push(origin);
        }
        out.push(Delivery::to(sender_conns, ServerEvent::MessageSent(message.clone())));

        out
    }

    /// Receipts for messages the receiver just read. Nothing when nothing changed.
    pub fn seen(
        sender: String,
        receiver: String,
        messages: Vec<Message>,
        sender_conns: Vec<ConnectionId>,
    ) -> Vec<Delivery> {
        if messages.is_empty() {
            return Vec::new();
        }
        vec![Delivery::to(
            sender_conns,
            ServerEvent::MessagesSeen(SeenReceipt {
                sender,
                receiver,
                messages,
            }),
        )]
    }

    pub fn status_updated(message: &Message, sender_conns: Vec<ConnectionId>) -> Vec<Delivery> {
        vec![Delivery::to(
            sender_conns,
            ServerEvent::MessageStatusUpdated(StatusUpdate {
                message_id: message.id,
                status: message.status,
            }),
        )]
    }

    pub fn typing(participants: Participants, receiver_conns: Vec<ConnectionId>) -> Vec<Delivery> {
        vec![Delivery::to(receiver_conns, ServerEvent::Typing(participants))]
    }

    pub fn deleted(message_id: Uuid) -> Vec<Delivery> {
        vec![Delivery::notify_all(ServerEvent::MessageDeleted(MessageDeleted {
            message_id,
        }))]
    }
}

fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}

#[derive(Clone)]
pub struct DeliveryEngine {
    store: StoreHandle,
    dispatcher: Dispatcher,
}

impl DeliveryEngine {
    pub fn new(store: StoreHandle, dispatcher: Dispatcher) -> Self {
        Self { store, dispatcher }
    }

    /// Persist a new message; promote it to `delivered` right away when the
    /// receiver has a live connection.
    pub async fn send(
        &self,
        origin: ConnectionId,
        req: SendMessage,
    ) -> Result<Vec<Delivery>, DeliveryError> {
        let SendMessage {
            sender,
            receiver,
            text,
        } = req;
        if is_blank(&sender) || is_blank(&receiver) || text.is_empty() {
            return Err(DeliveryError::Validation("Missing message data"));
        }

        let (s, r) = (sender.clone(), receiver.clone());
        let known = self
            .store
            .call(move |store| Ok(store.user_exists(&s)? && store.user_exists(&r)?))
            .await
            .map_err(DeliveryError::persistence("send message"))?;
        if !known {
            return Err(DeliveryError::NotFound("Unknown user"));
        }

        let mut message = Message::new(&sender, &receiver, &text, Utc::now());
        let record = message.clone();
        self.store
            .call(move |store| store.insert_message(&record))
            .await
            .map_err(DeliveryError::persistence("send message"))?;
        debug!("Message {} from {} to {} stored", message.id, sender, receiver);

        if !self.dispatcher.connections_for(&receiver).is_empty() {
            let (id, at) = (message.id, Utc::now());
            match self.store.call(move |store| store.mark_delivered(id, at)).await {
                Ok(DeliveryOutcome::Applied(updated)) => message = updated,
                Ok(other) => debug!("Message {} not promoted to delivered: {:?}", id, other),
                // The message itself is stored; report it as sent rather than
                // fail the send and invite a duplicate.
                Err(e) => error!("Failed to mark message {} delivered: {:#}", id, e),
            }
        }

        Ok(plan::sent(
            &message,
            origin,
            self.dispatcher.connections_for(&sender),
            self.dispatcher.connections_for(&receiver),
        ))
    }

    /// The receiver read the conversation: everything `sender` sent them that
    /// is not yet seen becomes seen.
    pub async fn mark_seen(&self, req: Participants) -> Result<Vec<Delivery>, DeliveryError> {
        let Participants { sender, receiver } = req;
        if is_blank(&sender) || is_blank(&receiver) {
            return Err(DeliveryError::Validation("Missing sender or receiver"));
        }

        let (s, r, at) = (sender.clone(), receiver.clone(), Utc::now());
        let seen = self
            .store
            .call(move |store| store.mark_seen(&s, &r, at))
            .await
            .map_err(DeliveryError::persistence("mark messages seen"))?;

        if seen.is_empty() {
            debug!("No unseen messages from {} to {}", sender, receiver);
            return Ok(Vec::new());
        }
        debug!("{} message(s) from {} seen by {}", seen.len(), sender, receiver);

        let sender_conns = self.dispatcher.connections_for(&sender);
        Ok(plan::seen(sender, receiver, seen, sender_conns))
    }

    /// Receiver-side delivery acknowledgement for one message.
    pub async fn mark_delivered(&self, req: MessageRef) -> Result<Vec<Delivery>, DeliveryError> {
        let id = req
            .message_id
            .ok_or(DeliveryError::Validation("Missing message id"))?;

        let at = Utc::now();
        let outcome = self
            .store
            .call(move |store| store.mark_delivered(id, at))
            .await
            .map_err(DeliveryError::persistence("update message status"))?;

        match outcome {
            DeliveryOutcome::Applied(message) => {
                let sender_conns = self.dispatcher.connections_for(&message.sender);
                Ok(plan::status_updated(&message, sender_conns))
            }
            DeliveryOutcome::Unchanged(status) => {
                debug!("Message {} already {}, ignoring delivery ack", id, status);
                Ok(Vec::new())
            }
            DeliveryOutcome::Missing => Err(DeliveryError::NotFound("Message not found")),
        }
    }

    /// Ephemeral: relayed to the receiver's connections, never stored.
    pub fn typing(&self, req: Participants) -> Result<Vec<Delivery>, DeliveryError> {
        if is_blank(&req.sender) || is_blank(&req.receiver) {
            return Err(DeliveryError::Validation("Missing sender or receiver"));
        }
        let receiver_conns = self.dispatcher.connections_for(&req.receiver);
        Ok(plan::typing(req, receiver_conns))
    }

    /// Archive and soft-delete a message, then tell every connection.
    pub async fn delete(&self, req: MessageRef) -> Result<Vec<Delivery>, DeliveryError> {
        let id = req
            .message_id
            .ok_or(DeliveryError::Validation("Missing message id"))?;

        let at = Utc::now();
        let archived = self
            .store
            .call(move |store| store.soft_delete(id, at))
            .await
            .map_err(DeliveryError::persistence("delete message"))?
            .ok_or(DeliveryError::NotFound("Message not found"))?;

        info!(
            "Message {} ({} -> {}) deleted and archived as {}",
            id, archived.sender, archived.receiver, archived.id
        );
        Ok(plan::deleted(id))
    }
}

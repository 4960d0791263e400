use anyhow::Result;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use nexsy_types::models::{DeletedMessage, Message, MessageStatus, UserSummary};

use crate::Database;

/// Result of a sent -> delivered request.
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryOutcome {
    /// The message moved to `delivered`; carries the updated record.
    Applied(Message),
    /// The message exists but is already past `sent`.
    Unchanged(MessageStatus),
    /// No live message with that id.
    Missing,
}

/// Persistence seen by the delivery engine and presence broadcaster.
///
/// Calls are blocking; async callers run them on the blocking pool. Any
/// `Err` is a persistence failure.
pub trait MessageStore: Send + Sync + 'static {
    fn user_exists(&self, username: &str) -> Result<bool>;

    fn set_presence(&self, username: &str, online: bool, at: DateTime<Utc>) -> Result<()>;

    /// Stamp offline unless `reconnected` (evaluated while the store is
    /// locked) says the identity is back. Returns whether it was stamped.
    fn set_offline_unless(
        &self,
        username: &str,
        at: DateTime<Utc>,
        reconnected: &dyn Fn() -> bool,
    ) -> Result<bool>;

    fn touch_last_seen(&self, username: &str, at: DateTime<Utc>) -> Result<()>;

    fn list_users(&self) -> Result<Vec<UserSummary>>;

    fn insert_message(&self, message: &Message) -> Result<()>;

    fn mark_delivered(&self, id: Uuid, at: DateTime<Utc>) -> Result<DeliveryOutcome>;

    fn mark_seen(&self, sender: &str, receiver: &str, at: DateTime<Utc>) -> Result<Vec<Message>>;

    fn soft_delete(&self, id: Uuid, at: DateTime<Utc>) -> Result<Option<DeletedMessage>>;
}

impl MessageStore for Database {
    fn user_exists(&self, username: &str) -> Result<bool> {
        Database::user_exists(self, username)
    }

    fn set_presence(&self, username: &str, online: bool, at: DateTime<Utc>) -> Result<()> {
        Database::set_presence(self, username, online, at)
    }

    fn set_offline_unless(
        &self,
        username: &str,
        at: DateTime<Utc>,
        reconnected: &dyn Fn() -> bool,
    ) -> Result<bool> {
        Database::set_offline_unless(self, username, at, reconnected)
    }

    fn touch_last_seen(&self, username: &str, at: DateTime<Utc>) -> Result<()> {
        Database::touch_last_seen(self, username, at)
    }

    fn list_users(&self) -> Result<Vec<UserSummary>> {
        Database::list_users(self)
    }

    fn insert_message(&self, message: &Message) -> Result<()> {
        Database::insert_message(self, message)
    }

    fn mark_delivered(&self, id: Uuid, at: DateTime<Utc>) -> Result<DeliveryOutcome> {
        Database::mark_delivered(self, id, at)
    }

    fn mark_seen(&self, sender: &str, receiver: &str, at: DateTime<Utc>) -> Result<Vec<Message>> {
        Database::mark_seen(self, sender, receiver, at)
    }

    fn soft_delete(&self, id: Uuid, at: DateTime<Utc>) -> Result<Option<DeletedMessage>> {
        Database::soft_delete(self, id, at)
    }
}

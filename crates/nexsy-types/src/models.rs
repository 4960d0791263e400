use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered user as exposed outside the store. The credential hash never
/// leaves nexsy-db.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub username: String,
    pub email: Option<String>,
    pub is_online: bool,
    pub last_seen: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Roster entry published in `allUsers` and served by `GET /api/users`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub username: String,
    pub is_online: bool,
    pub last_seen: DateTime<Utc>,
}

/// Delivery lifecycle of a message. Ordering follows the lifecycle, so
/// `Sent < Delivered < Seen`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Seen,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Seen => "seen",
        }
    }

    /// Whether moving from `self` to `next` is a legal forward step.
    pub fn can_advance_to(self, next: MessageStatus) -> bool {
        match (self, next) {
            (Self::Sent, Self::Delivered) => true,
            (Self::Sent | Self::Delivered, Self::Seen) => true,
            _ => false,
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown message status '{}'", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

impl FromStr for MessageStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(Self::Sent),
            "delivered" => Ok(Self::Delivered),
            "seen" => Ok(Self::Seen),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// A direct message between two users.
///
/// The transition methods below are the only way the lifecycle moves. The
/// store applies the same rules in SQL; these are the reference used by the
/// delivery engine and its tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub sender: String,
    pub receiver: String,
    pub text: String,
    pub status: MessageStatus,
    pub delivered_at: Option<DateTime<Utc>>,
    pub seen_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Message {
    pub fn new(sender: &str, receiver: &str, text: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender: sender.to_string(),
            receiver: receiver.to_string(),
            text: text.to_string(),
            status: MessageStatus::Sent,
            delivered_at: None,
            seen_at: None,
            is_deleted: false,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// sent -> delivered. Returns false (and changes nothing) from any other state.
    pub fn mark_delivered(&mut self, at: DateTime<Utc>) -> bool {
        if self.is_deleted || !self.status.can_advance_to(MessageStatus::Delivered) {
            return false;
        }
        self.status = MessageStatus::Delivered;
        self.delivered_at = Some(at);
        self.updated_at = at;
        true
    }

    /// sent|delivered -> seen. A message seen straight from `sent` keeps a
    /// null `delivered_at`.
    pub fn mark_seen(&mut self, at: DateTime<Utc>) -> bool {
        if self.is_deleted || !self.status.can_advance_to(MessageStatus::Seen) {
            return false;
        }
        self.status = MessageStatus::Seen;
        self.seen_at = Some(at);
        self.updated_at = at;
        true
    }

    /// Flag the message deleted and return the archive capture. `None` if it
    /// was already deleted.
    pub fn soft_delete(&mut self, at: DateTime<Utc>) -> Option<DeletedMessage> {
        if self.is_deleted {
            return None;
        }
        self.is_deleted = true;
        self.deleted_at = Some(at);
        self.updated_at = at;
        Some(DeletedMessage {
            id: Uuid::new_v4(),
            original_message_id: self.id,
            sender: self.sender.clone(),
            receiver: self.receiver.clone(),
            text: self.text.clone(),
            sent_at: self.created_at,
            deleted_at: at,
        })
    }
}

/// Append-only archive record written when a message is soft-deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedMessage {
    pub id: Uuid,
    pub original_message_id: Uuid,
    pub sender: String,
    pub receiver: String,
    pub text: String,
    pub sent_at: DateTime<Utc>,
    pub deleted_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg() -> Message {
        Message::new("bob", "amy", "hi", Utc::now())
    }

    #[test]
    fn test_forward_transitions() {
        let mut m = msg();
        assert_eq!(m.status, MessageStatus::Sent);

        let t1 = Utc::now();
        assert!(m.mark_delivered(t1));
        assert_eq!(m.delivered_at, Some(t1));

        let t2 = Utc::now();
        assert!(m.mark_seen(t2));
        assert_eq!(m.status, MessageStatus::Seen);
        assert_eq!(m.seen_at, Some(t2));
        assert_eq!(m.delivered_at, Some(t1));
    }

    #[test]
    fn test_no_regression() {
        let mut m = msg();
        assert!(m.mark_seen(Utc::now()));
        let seen_at = m.seen_at;

        assert!(!m.mark_delivered(Utc::now()));
        assert!(!m.mark_seen(Utc::now()));
        assert_eq!(m.status, MessageStatus::Seen);
        assert_eq!(m.seen_at, seen_at);
        assert_eq!(m.delivered_at, None);
    }

    #[test]
    fn test_delivered_is_stamped_once() {
        let mut m = msg();
        let first = Utc::now();
        assert!(m.mark_delivered(first));
        assert!(!m.mark_delivered(Utc::now()));
        assert_eq!(m.delivered_at, Some(first));
    }

    #[test]
    fn test_soft_delete_captures_original() {
        let mut m = msg();
        let at = Utc::now();
        let archived = m.soft_delete(at).expect("first delete archives");
        assert_eq!(archived.original_message_id, m.id);
        assert_eq!(archived.text, "hi");
        assert_eq!(archived.sent_at, m.created_at);
        assert_eq!(archived.deleted_at, at);
        assert!(m.is_deleted);

        assert!(m.soft_delete(Utc::now()).is_none());
        assert!(!m.mark_delivered(Utc::now()));
    }

    #[test]
    fn test_status_strings() {
        for s in [MessageStatus::Sent, MessageStatus::Delivered, MessageStatus::Seen] {
            assert_eq!(s.as_str().parse::<MessageStatus>(), Ok(s));
        }
        assert!("read".parse::<MessageStatus>().is_err());
        assert_eq!(
            serde_json::to_string(&MessageStatus::Delivered).unwrap(),
            "\"delivered\""
        );
    }

    #[test]
    fn test_message_wire_shape() {
        let m = msg();
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["_id"], m.id.to_string());
        assert_eq!(json["status"], "sent");
        assert!(json["deliveredAt"].is_null());
        assert_eq!(json["isDeleted"], false);
    }
}

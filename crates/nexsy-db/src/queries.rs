use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use nexsy_types::models::{DeletedMessage, Message, UserSummary};

use crate::Database;
use crate::models::{DeletedMessageRow, MessageRow, UserRow, encode_ts};
use crate::store::DeliveryOutcome;

const USER_COLUMNS: &str = "username, email, password, last_seen, is_online, created_at, updated_at";

const MESSAGE_COLUMNS: &str = "id, sender, receiver, text, status, delivered_at, seen_at, \
     is_deleted, deleted_at, created_at, updated_at";

impl Database {
    // -- Users --

    /// Insert a new account. Returns false, leaving the existing row alone,
    /// when the username is already taken.
    pub fn create_user(
        &self,
        username: &str,
        email: Option<&str>,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let ts = encode_ts(now);
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (username, email, password, last_seen, is_online, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, 0, ?4, ?4)
                 ON CONFLICT(username) DO NOTHING",
                params![username, email, password_hash, ts],
            )?;
            Ok(inserted == 1)
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_username(conn, username))
    }

    pub fn user_exists(&self, username: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row("SELECT 1 FROM users WHERE username = ?1", [username], |_| Ok(()))
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// Roster ordered by username.
    pub fn list_users(&self) -> Result<Vec<UserSummary>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM users ORDER BY username ASC",
                USER_COLUMNS
            ))?;
            let rows = stmt
                .query_map([], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(UserRow::into_summary).collect()
        })
    }

    /// Stamp the online flag and last-seen together. Unknown usernames are ignored.
    pub fn set_presence(&self, username: &str, online: bool, at: DateTime<Utc>) -> Result<()> {
        let ts = encode_ts(at);
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET is_online = ?2, last_seen = ?3, updated_at = ?3 WHERE username = ?1",
                params![username, online, ts],
            )?;
            Ok(())
        })
    }

    /// Stamp an identity offline unless `reconnected` reports a live
    /// connection. The check runs under the connection lock, so an online
    /// stamp from a registration racing this call is never overwritten.
    /// Returns whether the row was stamped.
    pub fn set_offline_unless(
        &self,
        username: &str,
        at: DateTime<Utc>,
        reconnected: &dyn Fn() -> bool,
    ) -> Result<bool> {
        let ts = encode_ts(at);
        self.with_conn(|conn| {
            if reconnected() {
                return Ok(false);
            }
            conn.execute(
                "UPDATE users SET is_online = 0, last_seen = ?2, updated_at = ?2 WHERE username = ?1",
                params![username, ts],
            )?;
            Ok(true)
        })
    }

    pub fn touch_last_seen(&self, username: &str, at: DateTime<Utc>) -> Result<()> {
        let ts = encode_ts(at);
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET last_seen = ?2, updated_at = ?2 WHERE username = ?1",
                params![username, ts],
            )?;
            Ok(())
        })
    }

    // -- Messages --

    pub fn insert_message(&self, message: &Message) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                &format!(
                    "INSERT INTO messages ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                    MESSAGE_COLUMNS
                ),
                params![
                    message.id.to_string(),
                    message.sender,
                    message.receiver,
                    message.text,
                    message.status.as_str(),
                    message.delivered_at.map(encode_ts),
                    message.seen_at.map(encode_ts),
                    message.is_deleted,
                    message.deleted_at.map(encode_ts),
                    encode_ts(message.created_at),
                    encode_ts(message.updated_at),
                ],
            )?;
            Ok(())
        })
    }

    /// A live (not deleted) message by id.
    pub fn get_message(&self, id: Uuid) -> Result<Option<Message>> {
        self.with_conn(|conn| query_live_message(conn, id))
    }

    /// sent -> delivered for one message, read and written in one transaction.
    pub fn mark_delivered(&self, id: Uuid, at: DateTime<Utc>) -> Result<DeliveryOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let Some(mut message) = query_live_message(&tx, id)? else {
                return Ok(DeliveryOutcome::Missing);
            };
            if !message.mark_delivered(at) {
                return Ok(DeliveryOutcome::Unchanged(message.status));
            }
            write_lifecycle(&tx, &message)?;
            tx.commit()?;
            Ok(DeliveryOutcome::Applied(message))
        })
    }

    /// Every live sender -> receiver message still `sent` or `delivered`
    /// becomes `seen`. Returns the updated messages, oldest first.
    pub fn mark_seen(&self, sender: &str, receiver: &str, at: DateTime<Utc>) -> Result<Vec<Message>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let rows = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT {} FROM messages
                     WHERE sender = ?1 AND receiver = ?2 AND is_deleted = 0
                       AND status IN ('sent', 'delivered')
                     ORDER BY created_at ASC, rowid ASC",
                    MESSAGE_COLUMNS
                ))?;
                stmt.query_map(params![sender, receiver], message_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?
            };

            let mut updated = Vec::with_capacity(rows.len());
            for row in rows {
                let mut message = Message::try_from(row)?;
                if message.mark_seen(at) {
                    write_lifecycle(&tx, &message)?;
                    updated.push(message);
                }
            }

            tx.commit()?;
            Ok(updated)
        })
    }

    /// Archive a copy and flag the message deleted, atomically. `None` if the
    /// message is absent or already deleted.
    pub fn soft_delete(&self, id: Uuid, at: DateTime<Utc>) -> Result<Option<DeletedMessage>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let Some(mut message) = query_live_message(&tx, id)? else {
                return Ok(None);
            };
            let Some(archived) = message.soft_delete(at) else {
                return Ok(None);
            };

            tx.execute(
                "INSERT INTO deleted_messages
                    (id, original_message_id, sender, receiver, text, sent_at, deleted_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    archived.id.to_string(),
                    archived.original_message_id.to_string(),
                    archived.sender,
                    archived.receiver,
                    archived.text,
                    encode_ts(archived.sent_at),
                    encode_ts(archived.deleted_at),
                ],
            )?;
            write_lifecycle(&tx, &message)?;
            tx.commit()?;
            Ok(Some(archived))
        })
    }

    /// Conversation history for one user: live messages they sent or
    /// received, oldest first.
    pub fn messages_for(&self, username: &str) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM messages
                 WHERE (sender = ?1 OR receiver = ?1) AND is_deleted = 0
                 ORDER BY created_at ASC, rowid ASC",
                MESSAGE_COLUMNS
            ))?;
            let rows = stmt
                .query_map([username], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(Message::try_from).collect()
        })
    }

    // -- Archive --

    pub fn archived_copies(&self, original_message_id: Uuid) -> Result<Vec<DeletedMessage>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, original_message_id, sender, receiver, text, sent_at, deleted_at
                 FROM deleted_messages WHERE original_message_id = ?1",
            )?;
            let rows = stmt
                .query_map([original_message_id.to_string()], |row| {
                    Ok(DeletedMessageRow {
                        id: row.get(0)?,
                        original_message_id: row.get(1)?,
                        sender: row.get(2)?,
                        receiver: row.get(3)?,
                        text: row.get(4)?,
                        sent_at: row.get(5)?,
                        deleted_at: row.get(6)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(DeletedMessage::try_from).collect()
        })
    }

    /// Cheap liveness probe for the health endpoint.
    pub fn ping(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |_| Ok(()))?;
            Ok(())
        })
    }
}

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        username: row.get(0)?,
        email: row.get(1)?,
        password: row.get(2)?,
        last_seen: row.get(3)?,
        is_online: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn message_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        sender: row.get(1)?,
        receiver: row.get(2)?,
        text: row.get(3)?,
        status: row.get(4)?,
        delivered_at: row.get(5)?,
        seen_at: row.get(6)?,
        is_deleted: row.get(7)?,
        deleted_at: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn query_user_by_username(conn: &Connection, username: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!("SELECT {} FROM users WHERE username = ?1", USER_COLUMNS))?;
    let row = stmt.query_row([username], user_from_row).optional()?;
    Ok(row)
}

fn query_live_message(conn: &Connection, id: Uuid) -> Result<Option<Message>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM messages WHERE id = ?1 AND is_deleted = 0",
        MESSAGE_COLUMNS
    ))?;
    let row = stmt.query_row([id.to_string()], message_from_row).optional()?;
    row.map(Message::try_from).transpose()
}

/// Persist the mutable lifecycle columns of a message.
fn write_lifecycle(conn: &Connection, message: &Message) -> Result<()> {
    conn.execute(
        "UPDATE messages
         SET status = ?2, delivered_at = ?3, seen_at = ?4, is_deleted = ?5, deleted_at = ?6, updated_at = ?7
         WHERE id = ?1",
        params![
            message.id.to_string(),
            message.status.as_str(),
            message.delivered_at.map(encode_ts),
            message.seen_at.map(encode_ts),
            message.is_deleted,
            message.deleted_at.map(encode_ts),
            encode_ts(message.updated_at),
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexsy_types::models::MessageStatus;

    fn db_with_users() -> Database {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        db.create_user("amy", None, "hash", now).unwrap();
        db.create_user("bob", Some("bob@example.com"), "hash", now).unwrap();
        db
    }

    fn send(db: &Database, sender: &str, receiver: &str, text: &str) -> Message {
        let m = Message::new(sender, receiver, text, Utc::now());
        db.insert_message(&m).unwrap();
        m
    }

    #[test]
    fn test_users_roundtrip_and_presence() {
        let db = db_with_users();
        assert!(db.user_exists("amy").unwrap());
        assert!(!db.user_exists("carol").unwrap());

        let at = Utc::now();
        db.set_presence("amy", true, at).unwrap();
        let roster = db.list_users().unwrap();
        assert_eq!(roster.len(), 2);
        assert_eq!(roster[0].username, "amy");
        assert!(roster[0].is_online);
        assert_eq!(roster[0].last_seen, at);
        assert!(!roster[1].is_online);

        let bob = db.get_user_by_username("bob").unwrap().unwrap().into_user().unwrap();
        assert_eq!(bob.email.as_deref(), Some("bob@example.com"));
    }

    #[test]
    fn test_duplicate_username_fails() {
        let db = db_with_users();
        assert!(!db.create_user("amy", None, "other", Utc::now()).unwrap());
        let amy = db.get_user_by_username("amy").unwrap().unwrap();
        assert_eq!(amy.password, "hash");
    }

    #[test]
    fn test_offline_stamp_yields_to_reconnect() {
        let db = db_with_users();
        let online_at = Utc::now();
        db.set_presence("amy", true, online_at).unwrap();

        assert!(!db.set_offline_unless("amy", Utc::now(), &|| true).unwrap());
        let amy = db.get_user_by_username("amy").unwrap().unwrap();
        assert!(amy.is_online);

        assert!(db.set_offline_unless("amy", Utc::now(), &|| false).unwrap());
        let amy = db.get_user_by_username("amy").unwrap().unwrap();
        assert!(!amy.is_online);
        assert!(amy.last_seen > encode_ts(online_at));
    }

    #[test]
    fn test_insert_and_get_message() {
        let db = db_with_users();
        let m = send(&db, "bob", "amy", "hi");
        let stored = db.get_message(m.id).unwrap().unwrap();
        assert_eq!(stored, m);
        assert!(db.get_message(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn test_mark_delivered_outcomes() {
        let db = db_with_users();
        let m = send(&db, "bob", "amy", "hi");

        let at = Utc::now();
        match db.mark_delivered(m.id, at).unwrap() {
            DeliveryOutcome::Applied(updated) => {
                assert_eq!(updated.status, MessageStatus::Delivered);
                assert_eq!(updated.delivered_at, Some(at));
            }
            other => panic!("expected Applied, got {:?}", other),
        }

        assert!(matches!(
            db.mark_delivered(m.id, Utc::now()).unwrap(),
            DeliveryOutcome::Unchanged(MessageStatus::Delivered)
        ));
        assert!(matches!(
            db.mark_delivered(Uuid::new_v4(), Utc::now()).unwrap(),
            DeliveryOutcome::Missing
        ));
        assert_eq!(db.get_message(m.id).unwrap().unwrap().delivered_at, Some(at));
    }

    #[test]
    fn test_mark_seen_only_touches_the_pair() {
        let db = db_with_users();
        let a = send(&db, "bob", "amy", "one");
        let b = send(&db, "bob", "amy", "two");
        let other = send(&db, "amy", "bob", "reply");

        let at = Utc::now();
        let seen = db.mark_seen("bob", "amy", at).unwrap();
        assert_eq!(seen.iter().map(|m| m.id).collect::<Vec<_>>(), vec![a.id, b.id]);
        assert!(seen.iter().all(|m| m.status == MessageStatus::Seen && m.seen_at == Some(at)));

        assert_eq!(db.get_message(other.id).unwrap().unwrap().status, MessageStatus::Sent);
        assert!(db.mark_seen("bob", "amy", Utc::now()).unwrap().is_empty());
    }

    #[test]
    fn test_soft_delete_archives_once() {
        let db = db_with_users();
        let m = send(&db, "bob", "amy", "oops");

        let archived = db.soft_delete(m.id, Utc::now()).unwrap().unwrap();
        assert_eq!(archived.original_message_id, m.id);
        assert_eq!(archived.text, "oops");
        assert_eq!(archived.sent_at, m.created_at);

        assert!(db.get_message(m.id).unwrap().is_none());
        assert!(db.messages_for("amy").unwrap().is_empty());
        assert!(db.soft_delete(m.id, Utc::now()).unwrap().is_none());
        assert_eq!(db.archived_copies(m.id).unwrap(), vec![archived]);
    }

    #[test]
    fn test_messages_for_is_ordered_and_scoped() {
        let db = db_with_users();
        db.create_user("carol", None, "hash", Utc::now()).unwrap();
        let first = send(&db, "bob", "amy", "1");
        let second = send(&db, "amy", "bob", "2");
        send(&db, "carol", "bob", "not amy's");

        let history = db.messages_for("amy").unwrap();
        assert_eq!(history.iter().map(|m| m.id).collect::<Vec<_>>(), vec![first.id, second.id]);
    }
}

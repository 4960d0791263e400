//! Database row types. These map directly to SQLite rows and stay distinct
//! from the nexsy-types models so the schema can change independently.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use nexsy_types::models::{DeletedMessage, Message, User, UserSummary};
use uuid::Uuid;

pub struct UserRow {
    pub username: String,
    pub email: Option<String>,
    pub password: String,
    pub last_seen: String,
    pub is_online: bool,
    pub created_at: String,
    pub updated_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub sender: String,
    pub receiver: String,
    pub text: String,
    pub status: String,
    pub delivered_at: Option<String>,
    pub seen_at: Option<String>,
    pub is_deleted: bool,
    pub deleted_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

pub struct DeletedMessageRow {
    pub id: String,
    pub original_message_id: String,
    pub sender: String,
    pub receiver: String,
    pub text: String,
    pub sent_at: String,
    pub deleted_at: String,
}

pub fn encode_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn decode_ts(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("corrupt timestamp '{}'", raw))?
        .with_timezone(&Utc))
}

fn decode_opt_ts(raw: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    raw.map(decode_ts).transpose()
}

fn decode_id(raw: &str) -> Result<Uuid> {
    raw.parse().with_context(|| format!("corrupt id '{}'", raw))
}

impl UserRow {
    pub fn into_user(self) -> Result<User> {
        Ok(User {
            last_seen: decode_ts(&self.last_seen)?,
            created_at: decode_ts(&self.created_at)?,
            updated_at: decode_ts(&self.updated_at)?,
            username: self.username,
            email: self.email,
            is_online: self.is_online,
        })
    }

    pub fn into_summary(self) -> Result<UserSummary> {
        Ok(UserSummary {
            last_seen: decode_ts(&self.last_seen)?,
            username: self.username,
            is_online: self.is_online,
        })
    }
}

impl TryFrom<MessageRow> for Message {
    type Error = anyhow::Error;

    fn try_from(row: MessageRow) -> Result<Self> {
        Ok(Message {
            id: decode_id(&row.id)?,
            status: row
                .status
                .parse()
                .with_context(|| format!("message '{}'", row.id))?,
            delivered_at: decode_opt_ts(row.delivered_at.as_deref())?,
            seen_at: decode_opt_ts(row.seen_at.as_deref())?,
            deleted_at: decode_opt_ts(row.deleted_at.as_deref())?,
            created_at: decode_ts(&row.created_at)?,
            updated_at: decode_ts(&row.updated_at)?,
            is_deleted: row.is_deleted,
            sender: row.sender,
            receiver: row.receiver,
            text: row.text,
        })
    }
}

impl TryFrom<DeletedMessageRow> for DeletedMessage {
    type Error = anyhow::Error;

    fn try_from(row: DeletedMessageRow) -> Result<Self> {
        Ok(DeletedMessage {
            id: decode_id(&row.id)?,
            original_message_id: decode_id(&row.original_message_id)?,
            sent_at: decode_ts(&row.sent_at)?,
            deleted_at: decode_ts(&row.deleted_at)?,
            sender: row.sender,
            receiver: row.receiver,
            text: row.text,
        })
    }
}

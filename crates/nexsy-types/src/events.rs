use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Message, MessageStatus, UserSummary};

// -- Payloads --
//
// Inbound payload fields default to empty so a missing field reaches
// validation (and an `error` event) instead of failing the whole frame.

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserRef {
    pub username: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SendMessage {
    pub sender: String,
    pub receiver: String,
    pub text: String,
}

/// A sender/receiver pair, used by `mark_messages_seen` and `typing`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Participants {
    pub sender: String,
    pub receiver: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MessageRef {
    pub message_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub message_id: Uuid,
    pub status: MessageStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeenReceipt {
    pub sender: String,
    pub receiver: String,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDeleted {
    pub message_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationHint {
    pub sender: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

/// Events sent FROM client TO server over the WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Bind this connection to a user identity
    #[serde(rename = "registerUser")]
    RegisterUser(UserRef),

    SendMessage(SendMessage),

    /// The receiver has read everything `sender` sent them
    MarkMessagesSeen(Participants),

    /// Receiver-side acknowledgement that a message arrived
    MessageDelivered(MessageRef),

    Typing(Participants),

    DeleteMessage(MessageRef),

    /// Activity ping: refresh last-seen and republish the roster
    UpdateLastSeen(UserRef),
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RegisterUser(_) => "registerUser",
            Self::SendMessage(_) => "send_message",
            Self::MarkMessagesSeen(_) => "mark_messages_seen",
            Self::MessageDelivered(_) => "message_delivered",
            Self::Typing(_) => "typing",
            Self::DeleteMessage(_) => "delete_message",
            Self::UpdateLastSeen(_) => "update_last_seen",
        }
    }
}

/// Events sent FROM server TO client over the WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Deduplicated usernames with at least one live connection
    #[serde(rename = "onlineUsers")]
    OnlineUsers(Vec<String>),

    /// Full roster with last-seen, for rendering offline users
    #[serde(rename = "allUsers")]
    AllUsers(Vec<UserSummary>),

    ReceiveMessage(Message),

    MessageSent(Message),

    MessageStatusUpdated(StatusUpdate),

    MessagesSeen(SeenReceipt),

    MessageDeleted(MessageDeleted),

    Typing(Participants),

    PlayNotification(NotificationHint),

    Error(ErrorPayload),
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorPayload {
            message: message.into(),
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::OnlineUsers(_) => "onlineUsers",
            Self::AllUsers(_) => "allUsers",
            Self::ReceiveMessage(_) => "receive_message",
            Self::MessageSent(_) => "message_sent",
            Self::MessageStatusUpdated(_) => "message_status_updated",
            Self::MessagesSeen(_) => "messages_seen",
            Self::MessageDeleted(_) => "message_deleted",
            Self::Typing(_) => "typing",
            Self::PlayNotification(_) => "play_notification",
            Self::Error(_) => "error",
        }
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Attachment, Message, MessageView, OnlineUser, ReactionSummary};

/// One inbound frame from a community gateway connection. `requestId` is
/// echoed back on any `error` event the frame causes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundFrame {
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(flatten)]
    pub envelope: ClientEnvelope,
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientEnvelope {
    /// Subscribe this connection to one channel
    Join {
        channel_id: String,
        #[serde(default)]
        community_id: Option<String>,
        /// Asserted identity; may be omitted when `token` is sent
        #[serde(default)]
        user_id: String,
        #[serde(default)]
        username: String,
        /// Session token issued by `/auth/login`
        #[serde(default)]
        token: Option<String>,
    },

    /// Post a message to the joined channel
    Message {
        #[serde(default)]
        content: Option<String>,
        #[serde(default)]
        reply_to_id: Option<String>,
        #[serde(default)]
        attachment: Option<Attachment>,
    },

    Reaction {
        message_id: String,
        emoji: String,
        action: ReactionAction,
    },

    /// Indicate typing in the joined channel
    Typing,

    EditMessage {
        message_id: String,
        content: String,
    },

    DeleteMessage {
        message_id: String,
    },
}

impl ClientEnvelope {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::Message { .. } => "message",
            Self::Reaction { .. } => "reaction",
            Self::Typing => "typing",
            Self::EditMessage { .. } => "edit_message",
            Self::DeleteMessage { .. } => "delete_message",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionAction {
    Add,
    Remove,
}

/// Events sent over the community gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    NewMessage {
        message: MessageView,
    },

    MessageEdited {
        message: Message,
    },

    MessageDeleted {
        message_id: String,
    },

    /// Full reaction state of one message; clients replace, never merge
    ReactionUpdate {
        message_id: String,
        reactions: Vec<ReactionSummary>,
    },

    Typing {
        user_id: String,
        username: String,
    },

    /// Who is connected to the channel, sent only to the joining connection
    Presence {
        users: Vec<OnlineUser>,
    },

    UserJoined {
        user_id: String,
        username: String,
        timestamp: DateTime<Utc>,
    },

    UserLeft {
        user_id: String,
        username: String,
        timestamp: DateTime<Utc>,
    },

    /// The acting connection's last frame had no effect
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        kind: ErrorKind,
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Unauthorized,
    NotFound,
    Store,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Unauthorized => "unauthorized",
            Self::NotFound => "not_found",
            Self::Store => "store",
        }
    }
}

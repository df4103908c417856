//! WebSocket Event DTOs - Data Transfer Objects per eventi WebSocket

use crate::core::{AppError, ErrorKind};
use crate::dtos::{MessageDTO, PresenceDTO, SendMessageDTO};
use crate::entities::DeleteMode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Eventi in ingresso dal client.
/// Tagged union, serde serializza come:
/// { "type": "send_message", "data": { ... } }
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    Identify { token: String },
    SendMessage(SendMessageDTO),
    DeleteMessage { message_id: i64, mode: DeleteMode },
    MarkSeen { peer_id: String },
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Identify { .. } => "identify",
            ClientEvent::SendMessage(_) => "send_message",
            ClientEvent::DeleteMessage { .. } => "delete_message",
            ClientEvent::MarkSeen { .. } => "mark_seen",
        }
    }
}

/// Eventi in uscita verso il client
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    Identified {
        user_id: String,
        society_id: String,
        session_id: u64,
    },
    PresenceSnapshot(Vec<PresenceDTO>),
    PresenceChanged(PresenceDTO),
    MessageReceived(MessageDTO),
    MessageDeleted {
        mode: DeleteMode,
        message_id: i64,
        // presente solo per `for_everyone`: il messaggio con il tombstone
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<MessageDTO>,
    },
    MessagesSeen {
        by: String,
        count: u64,
        seen_at: DateTime<Utc>,
    },
    Error {
        kind: ErrorKind,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },
}

impl From<&AppError> for ServerEvent {
    fn from(err: &AppError) -> Self {
        ServerEvent::Error {
            kind: err.kind(),
            message: err.message().to_string(),
            details: err.details().map(str::to_string),
        }
    }
}

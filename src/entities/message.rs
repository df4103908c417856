//! Message entity - Entità messaggio (chat diretta e buzz)

use super::enums::{AttachmentKind, ScopeKind};
use crate::core::CurrentUser;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Contenuto che sostituisce un messaggio cancellato per tutti
pub const TOMBSTONE: &str = "This message was deleted";

/// Destinatario di un messaggio: esattamente una delle tre forme.
/// Non cambia mai dopo la creazione del messaggio.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecipientScope {
    Direct { peer_id: String },
    Society { society_id: String },
    Group { society_id: String, group_id: i64 },
}

impl RecipientScope {
    pub fn kind(&self) -> ScopeKind {
        match self {
            RecipientScope::Direct { .. } => ScopeKind::Direct,
            RecipientScope::Society { .. } => ScopeKind::Society,
            RecipientScope::Group { .. } => ScopeKind::Group,
        }
    }

    /// Society dello scope, `None` per le chat dirette
    pub fn society_id(&self) -> Option<&str> {
        match self {
            RecipientScope::Direct { .. } => None,
            RecipientScope::Society { society_id } | RecipientScope::Group { society_id, .. } => {
                Some(society_id)
            }
        }
    }

    pub fn is_buzz(&self) -> bool {
        !matches!(self, RecipientScope::Direct { .. })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub kind: AttachmentKind,
    pub url: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Message {
    pub message_id: i64,
    pub sender_id: String,
    // denormalizzato alla creazione
    pub sender_name: String,
    pub scope: RecipientScope,
    pub content: String,
    pub attachment: Option<Attachment>,
    pub created_at: DateTime<Utc>,
    pub deleted_for_all: bool,
    // solo per le chat dirette
    pub seen_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Chi può cancellare il messaggio per tutti:
    /// - chat diretta: solo il mittente
    /// - buzz: il mittente oppure un admin della stessa society
    pub fn can_be_deleted_for_all_by(&self, user: &CurrentUser) -> bool {
        if self.sender_id == user.user_id {
            return true;
        }
        match self.scope.society_id() {
            Some(society_id) => user.administers(society_id),
            None => false,
        }
    }
}

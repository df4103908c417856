//! Message DTOs - Data Transfer Objects per messaggi
//!
//! `MessageDTO` è l'unica rappresentazione di un messaggio verso il client: la stessa struct
//! viene restituita dalle rotte HTTP e inviata nell'evento live `message_received`.

use crate::core::AppError;
use crate::entities::{Attachment, Message, RecipientScope};
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use validator::Validate;

lazy_static! {
    /// Forma accettata per identificativi di utenti e society forniti dal client
    static ref ID_PATTERN: Regex = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.:@\-]{0,127}$")
        .expect("identifier pattern is a valid regex");
}

pub fn is_valid_identifier(value: &str) -> bool {
    ID_PATTERN.is_match(value)
}

/// Struct per gestire l'output verso il client
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MessageDTO {
    pub message_id: i64,
    pub sender_id: String,
    pub sender_name: String,
    pub scope: RecipientScope,
    pub content: String,
    pub attachment: Option<Attachment>,
    pub created_at: DateTime<Utc>,
    pub deleted_for_all: bool,
    pub seen_at: Option<DateTime<Utc>>,
}

impl From<Message> for MessageDTO {
    fn from(value: Message) -> Self {
        Self {
            message_id: value.message_id,
            sender_id: value.sender_id,
            sender_name: value.sender_name,
            scope: value.scope,
            content: value.content,
            attachment: value.attachment,
            created_at: value.created_at,
            deleted_for_all: value.deleted_for_all,
            seen_at: value.seen_at,
        }
    }
}

/// DTO per inviare un nuovo messaggio (id, mittente e timestamp li assegna il server)
#[derive(Serialize, Deserialize, Debug, Clone, Validate)]
pub struct SendMessageDTO {
    pub scope: RecipientScope,

    #[serde(default)]
    #[validate(length(max = 5000, message = "Message content must be at most 5000 characters"))]
    pub content: String,

    #[serde(default)]
    pub attachment: Option<Attachment>,
}

impl SendMessageDTO {
    /// Validazione completa della bozza, eseguita prima di qualsiasi scrittura
    pub fn check(&self) -> Result<(), AppError> {
        self.validate()?;

        match &self.attachment {
            Some(attachment) if attachment.url.trim().is_empty() => {
                return Err(AppError::validation("Attachment url must not be empty"));
            }
            None if self.content.trim().is_empty() => {
                return Err(AppError::validation(
                    "Message content may be empty only with an attachment",
                ));
            }
            _ => {}
        }

        match &self.scope {
            RecipientScope::Direct { peer_id } => {
                if !is_valid_identifier(peer_id) {
                    return Err(AppError::validation("Invalid peer identifier"));
                }
            }
            RecipientScope::Society { society_id } => {
                if !is_valid_identifier(society_id) {
                    return Err(AppError::validation("Invalid society identifier"));
                }
            }
            RecipientScope::Group {
                society_id,
                group_id,
            } => {
                if !is_valid_identifier(society_id) {
                    return Err(AppError::validation("Invalid society identifier"));
                }
                if *group_id <= 0 {
                    return Err(AppError::validation("Invalid group identifier"));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ErrorKind;
    use crate::entities::AttachmentKind;

    fn draft(content: &str, attachment: Option<Attachment>) -> SendMessageDTO {
        SendMessageDTO {
            scope: RecipientScope::Direct {
                peer_id: "bob".into(),
            },
            content: content.into(),
            attachment,
        }
    }

    #[test]
    fn empty_content_without_attachment_is_rejected() {
        let err = draft("", None).check().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = draft("   ", None).check().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn empty_content_with_attachment_is_accepted() {
        let attachment = Attachment {
            kind: AttachmentKind::Image,
            url: "http://media/1.png".into(),
        };
        assert!(draft("", Some(attachment)).check().is_ok());
    }

    #[test]
    fn oversized_content_is_rejected() {
        let long = "a".repeat(5001);
        assert_eq!(draft(&long, None).check().unwrap_err().kind(), ErrorKind::Validation);
    }

    #[test]
    fn malformed_scope_identifiers_are_rejected() {
        let mut d = draft("hi", None);
        d.scope = RecipientScope::Direct { peer_id: "".into() };
        assert!(d.check().is_err());
        d.scope = RecipientScope::Group {
            society_id: "s1".into(),
            group_id: 0,
        };
        assert!(d.check().is_err());
        d.scope = RecipientScope::Society {
            society_id: "has spaces".into(),
        };
        assert!(d.check().is_err());
    }

    #[test]
    fn draft_parses_from_wire_json() {
        let json = r#"{"scope":{"kind":"society","society_id":"s1"},"content":"Hello society"}"#;
        let d: SendMessageDTO = serde_json::from_str(json).unwrap();
        assert!(d.check().is_ok());
        assert!(d.attachment.is_none());
    }
}

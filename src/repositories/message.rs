//! MessageRepository - Message store per chat dirette e buzz
//!
//! È la fonte di verità per lo storico e per lo stato di cancellazione dei messaggi.

use super::{Read, from_millis, now_millis};
use crate::core::{AppError, CurrentUser};
use crate::dtos::SendMessageDTO;
use crate::dtos::query::MAX_HISTORY_LIMIT;
use crate::entities::{Attachment, AttachmentKind, Message, RecipientScope, ScopeKind, TOMBSTONE};
use chrono::{DateTime, Utc};
use sqlx::{Error, FromRow, QueryBuilder, Sqlite, SqlitePool};
use tracing::{debug, info, instrument, warn};

const MESSAGE_COLUMNS: &str = r#"
    m.message_id,
    m.sender_id,
    m.sender_name,
    m.scope_kind,
    m.peer_id,
    m.society_id,
    m.group_id,
    m.content,
    m.attachment_kind,
    m.attachment_url,
    m.created_at,
    m.deleted_for_all,
    m.seen_at
"#;

#[derive(FromRow)]
struct MessageRow {
    message_id: i64,
    sender_id: String,
    sender_name: String,
    scope_kind: String,
    peer_id: Option<String>,
    society_id: Option<String>,
    group_id: Option<i64>,
    content: String,
    attachment_kind: Option<String>,
    attachment_url: Option<String>,
    created_at: i64,
    deleted_for_all: bool,
    seen_at: Option<i64>,
}

impl TryFrom<MessageRow> for Message {
    type Error = Error;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        let kind: ScopeKind = row.scope_kind.parse().map_err(Error::Protocol)?;
        let scope = match (kind, row.peer_id, row.society_id, row.group_id) {
            (ScopeKind::Direct, Some(peer_id), None, None) => RecipientScope::Direct { peer_id },
            (ScopeKind::Society, None, Some(society_id), None) => {
                RecipientScope::Society { society_id }
            }
            (ScopeKind::Group, None, Some(society_id), Some(group_id)) => RecipientScope::Group {
                society_id,
                group_id,
            },
            _ => {
                return Err(Error::Protocol(format!(
                    "message {} has an inconsistent scope",
                    row.message_id
                )));
            }
        };

        let attachment = match (row.attachment_kind, row.attachment_url) {
            (Some(kind), Some(url)) => Some(Attachment {
                kind: kind.parse::<AttachmentKind>().map_err(Error::Protocol)?,
                url,
            }),
            _ => None,
        };

        Ok(Message {
            message_id: row.message_id,
            sender_id: row.sender_id,
            sender_name: row.sender_name,
            scope,
            content: row.content,
            attachment,
            created_at: from_millis(row.created_at)?,
            deleted_for_all: row.deleted_for_all,
            seen_at: row.seen_at.map(from_millis).transpose()?,
        })
    }
}

// MESSAGE REPO
pub struct MessageRepository {
    connection_pool: SqlitePool,
}

impl MessageRepository {
    pub fn new(connection_pool: SqlitePool) -> Self {
        Self { connection_pool }
    }

    /// Salva un nuovo messaggio assegnando id e timestamp.
    /// La bozza viene validata prima della scrittura: un messaggio non valido non viene mai salvato.
    #[instrument(skip(self, sender, draft), fields(sender_id = %sender.user_id, scope = ?draft.scope.kind()))]
    pub async fn append(
        &self,
        sender: &CurrentUser,
        draft: &SendMessageDTO,
    ) -> Result<Message, AppError> {
        if sender.user_id.trim().is_empty() {
            warn!("Append attempted without sender");
            return Err(AppError::validation("Message sender is required"));
        }
        draft.check()?;
        if draft.scope.is_buzz() && sender.display_name.trim().is_empty() {
            warn!("Buzz append attempted without sender display name");
            return Err(AppError::validation("Sender display name is required for buzz"));
        }
        if let RecipientScope::Direct { peer_id } = &draft.scope {
            if *peer_id == sender.user_id {
                return Err(AppError::validation("Cannot send a direct message to yourself"));
            }
        }

        let (peer_id, society_id, group_id) = match &draft.scope {
            RecipientScope::Direct { peer_id } => (Some(peer_id.as_str()), None, None),
            RecipientScope::Society { society_id } => (None, Some(society_id.as_str()), None),
            RecipientScope::Group {
                society_id,
                group_id,
            } => (None, Some(society_id.as_str()), Some(*group_id)),
        };
        let created_at = now_millis();

        let result = sqlx::query(
            r#"
            INSERT INTO messages (
                sender_id, sender_name, scope_kind, peer_id, society_id, group_id,
                content, attachment_kind, attachment_url, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&sender.user_id)
        .bind(&sender.display_name)
        .bind(draft.scope.kind().as_str())
        .bind(peer_id)
        .bind(society_id)
        .bind(group_id)
        .bind(&draft.content)
        .bind(draft.attachment.as_ref().map(|a| a.kind.as_str()))
        .bind(draft.attachment.as_ref().map(|a| a.url.as_str()))
        .bind(created_at.timestamp_millis())
        .execute(&self.connection_pool)
        .await?;

        let message = Message {
            message_id: result.last_insert_rowid(),
            sender_id: sender.user_id.clone(),
            sender_name: sender.display_name.clone(),
            scope: draft.scope.clone(),
            content: draft.content.clone(),
            attachment: draft.attachment.clone(),
            created_at,
            deleted_for_all: false,
            seen_at: None,
        };

        info!(message_id = message.message_id, "Message appended");
        Ok(message)
    }

    /// Storico di uno scope visto da `requesting_user`, ordinato per `created_at` crescente.
    /// I messaggi nascosti a quell'utente ("cancella per me") sono esclusi.
    ///
    /// Per le chat dirette `scope` indica l'altro utente e viene restituito l'intero thread
    /// tra i due. Con `limit` si ottengono gli ultimi `limit` messaggi (sempre dal più vecchio),
    /// con `before` solo quelli creati prima di quell'istante.
    #[instrument(skip(self), fields(scope = ?scope.kind()))]
    pub async fn history(
        &self,
        scope: &RecipientScope,
        requesting_user: &str,
        before: Option<&DateTime<Utc>>,
        limit: Option<i64>,
    ) -> Result<Vec<Message>, AppError> {
        if let Some(limit) = limit {
            if !(1..=MAX_HISTORY_LIMIT).contains(&limit) {
                return Err(AppError::validation("History limit out of range"));
            }
        }

        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM messages m WHERE ", MESSAGE_COLUMNS));

        match scope {
            RecipientScope::Direct { peer_id } => {
                qb.push("m.scope_kind = 'direct' AND ((m.sender_id = ")
                    .push_bind(requesting_user)
                    .push(" AND m.peer_id = ")
                    .push_bind(peer_id.as_str())
                    .push(") OR (m.sender_id = ")
                    .push_bind(peer_id.as_str())
                    .push(" AND m.peer_id = ")
                    .push_bind(requesting_user)
                    .push("))");
            }
            RecipientScope::Society { society_id } => {
                qb.push("m.scope_kind = 'society' AND m.society_id = ")
                    .push_bind(society_id.as_str());
            }
            RecipientScope::Group {
                society_id,
                group_id,
            } => {
                qb.push("m.scope_kind = 'group' AND m.society_id = ")
                    .push_bind(society_id.as_str())
                    .push(" AND m.group_id = ")
                    .push_bind(*group_id);
            }
        }

        qb.push(
            " AND NOT EXISTS (SELECT 1 FROM message_hidden h WHERE h.message_id = m.message_id AND h.user_id = ",
        )
        .push_bind(requesting_user)
        .push(")");

        if let Some(before) = before {
            qb.push(" AND m.created_at < ")
                .push_bind(before.timestamp_millis());
        }

        match limit {
            Some(limit) => {
                qb.push(" ORDER BY m.created_at DESC, m.message_id DESC LIMIT ")
                    .push_bind(limit);
            }
            None => {
                qb.push(" ORDER BY m.created_at ASC, m.message_id ASC");
            }
        }

        let rows: Vec<MessageRow> = qb
            .build_query_as()
            .fetch_all(&self.connection_pool)
            .await?;

        let mut messages = rows
            .into_iter()
            .map(Message::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        if limit.is_some() {
            messages.reverse();
        }

        debug!(count = messages.len(), "History loaded");
        Ok(messages)
    }

    /// Nasconde il messaggio a un utente. Idempotente.
    ///
    /// # Returns
    /// * `Ok(true)` - il messaggio è stato nascosto ora
    /// * `Ok(false)` - era già nascosto a quell'utente
    /// * `Err(NotFound)` - il messaggio non esiste
    #[instrument(skip(self), fields(message_id = %message_id, user_id = %user_id))]
    pub async fn mark_deleted_for_user(
        &self,
        message_id: i64,
        user_id: &str,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO message_hidden (message_id, user_id, hidden_at)
            SELECT ?, ?, ?
            WHERE EXISTS (SELECT 1 FROM messages WHERE message_id = ?)
            "#,
        )
        .bind(message_id)
        .bind(user_id)
        .bind(now_millis().timestamp_millis())
        .bind(message_id)
        .execute(&self.connection_pool)
        .await?;

        if result.rows_affected() == 1 {
            info!("Message hidden for user");
            return Ok(true);
        }

        // nessuna riga inserita: già nascosto oppure messaggio inesistente
        match self.read(&message_id).await? {
            Some(_) => {
                debug!("Message was already hidden for user");
                Ok(false)
            }
            None => Err(AppError::not_found("Message not found")),
        }
    }

    /// Cancella il messaggio per tutti sostituendo il contenuto con il tombstone.
    /// La riga resta nel db; il flag non torna mai indietro.
    ///
    /// # Returns
    /// * `Ok((message, true))` - messaggio appena cancellato
    /// * `Ok((message, false))` - era già cancellato, nessuna modifica
    /// * `Err(Authorization)` - `requester` non è il mittente (né un admin della society per i buzz)
    #[instrument(skip(self, requester), fields(message_id = %message_id, user_id = %requester.user_id))]
    pub async fn mark_deleted_for_all(
        &self,
        message_id: i64,
        requester: &CurrentUser,
    ) -> Result<(Message, bool), AppError> {
        // mittente e scope sono immutabili: il controllo resta valido anche per l'update successivo
        let message = self
            .read(&message_id)
            .await?
            .ok_or_else(|| AppError::not_found("Message not found"))?;

        if !message.can_be_deleted_for_all_by(requester) {
            warn!("Delete for everyone refused");
            return Err(AppError::forbidden(
                "Only the sender or a society admin can delete this message for everyone",
            ));
        }

        let result = sqlx::query(
            r#"
            UPDATE messages
            SET content = ?, attachment_kind = NULL, attachment_url = NULL, deleted_for_all = 1
            WHERE message_id = ? AND deleted_for_all = 0
            "#,
        )
        .bind(TOMBSTONE)
        .bind(message_id)
        .execute(&self.connection_pool)
        .await?;

        let changed = result.rows_affected() == 1;
        let message = self
            .read(&message_id)
            .await?
            .ok_or_else(|| AppError::not_found("Message not found"))?;

        if changed {
            info!("Message deleted for everyone");
        } else {
            debug!("Message was already deleted for everyone");
        }
        Ok((message, changed))
    }

    /// Segna come visti tutti i messaggi diretti di `peer_id` verso `reader_id` non ancora visti
    #[instrument(skip(self))]
    pub async fn mark_seen(
        &self,
        reader_id: &str,
        peer_id: &str,
    ) -> Result<(u64, DateTime<Utc>), AppError> {
        let seen_at = now_millis();
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET seen_at = ?
            WHERE scope_kind = 'direct' AND sender_id = ? AND peer_id = ? AND seen_at IS NULL
            "#,
        )
        .bind(seen_at.timestamp_millis())
        .bind(peer_id)
        .bind(reader_id)
        .execute(&self.connection_pool)
        .await?;

        debug!(count = result.rows_affected(), "Messages marked as seen");
        Ok((result.rows_affected(), seen_at))
    }

    /// Utenti per cui il messaggio è nascosto
    #[cfg(test)]
    pub async fn hidden_for(&self, message_id: i64) -> Result<Vec<String>, Error> {
        sqlx::query_scalar("SELECT user_id FROM message_hidden WHERE message_id = ? ORDER BY user_id")
            .bind(message_id)
            .fetch_all(&self.connection_pool)
            .await
    }
}

impl Read<Message, i64> for MessageRepository {
    async fn read(&self, id: &i64) -> Result<Option<Message>, Error> {
        let row: Option<MessageRow> = sqlx::query_as(&format!(
            "SELECT {} FROM messages m WHERE m.message_id = ?",
            MESSAGE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.connection_pool)
        .await?;

        row.map(Message::try_from).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ErrorKind;
    use crate::repositories::init_pool;
    use std::time::Duration;

    async fn repo() -> MessageRepository {
        let pool = init_pool("sqlite::memory:", 1, Duration::from_secs(60))
            .await
            .expect("db");
        MessageRepository::new(pool)
    }

    fn user(id: &str) -> CurrentUser {
        CurrentUser {
            user_id: id.into(),
            society_id: "s1".into(),
            display_name: id.to_uppercase(),
            is_admin: false,
        }
    }

    fn direct(peer: &str, content: &str) -> SendMessageDTO {
        SendMessageDTO {
            scope: RecipientScope::Direct {
                peer_id: peer.into(),
            },
            content: content.into(),
            attachment: None,
        }
    }

    fn public(content: &str) -> SendMessageDTO {
        SendMessageDTO {
            scope: RecipientScope::Society {
                society_id: "s1".into(),
            },
            content: content.into(),
            attachment: None,
        }
    }

    #[tokio::test]
    async fn direct_message_visible_from_both_sides() {
        let repo = repo().await;
        let a = user("a");
        let m = repo.append(&a, &direct("b", "Hi")).await.unwrap();

        let from_a = repo.history(&RecipientScope::Direct { peer_id: "b".into() }, "a", None, None).await.unwrap();
        let from_b = repo.history(&RecipientScope::Direct { peer_id: "a".into() }, "b", None, None).await.unwrap();

        assert_eq!(from_a.len(), 1);
        assert_eq!(from_b.len(), 1);
        assert_eq!(from_a[0].content, "Hi");
        assert_eq!(from_b[0].sender_id, "a");
        assert_eq!(from_a[0].message_id, m.message_id);
        assert_eq!(from_b[0], m);
    }

    #[tokio::test]
    async fn history_is_ordered_and_scoped() {
        let repo = repo().await;
        for i in 0..5 {
            repo.append(&user("a"), &public(&format!("m{}", i))).await.unwrap();
        }
        repo.append(&user("a"), &direct("b", "private")).await.unwrap();

        let scope = RecipientScope::Society { society_id: "s1".into() };
        let history = repo.history(&scope, "c", None, None).await.unwrap();
        assert_eq!(history.len(), 5);
        assert!(history.windows(2).all(|w| w[0].created_at <= w[1].created_at));
        assert!(history.windows(2).all(|w| w[0].message_id < w[1].message_id));

        let other = RecipientScope::Society { society_id: "s2".into() };
        assert!(repo.history(&other, "c", None, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn history_limit_returns_latest_oldest_first() {
        let repo = repo().await;
        for i in 0..5 {
            repo.append(&user("a"), &public(&format!("m{}", i))).await.unwrap();
        }
        let scope = RecipientScope::Society { society_id: "s1".into() };
        let page = repo.history(&scope, "a", None, Some(2)).await.unwrap();
        let contents: Vec<_> = page.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m3", "m4"]);

        let err = repo.history(&scope, "a", None, Some(0)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn invalid_drafts_are_never_stored() {
        let repo = repo().await;
        let err = repo.append(&user("a"), &public("")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = repo.append(&user("a"), &direct("a", "me")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = repo.append(&user(""), &public("x")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let scope = RecipientScope::Society { society_id: "s1".into() };
        assert!(repo.history(&scope, "a", None, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn buzz_requires_sender_display_name() {
        let repo = repo().await;
        let mut anonymous = user("a");
        anonymous.display_name = "  ".into();

        let err = repo.append(&anonymous, &public("hello block")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let scope = RecipientScope::Society { society_id: "s1".into() };
        assert!(repo.history(&scope, "a", None, None).await.unwrap().is_empty());

        // per le chat dirette il nome non serve
        let m = repo.append(&anonymous, &direct("b", "hi")).await.unwrap();
        assert_eq!(m.sender_name, "  ");
    }

    #[tokio::test]
    async fn delete_for_user_is_idempotent_and_personal() {
        let repo = repo().await;
        let m = repo.append(&user("a"), &public("hello")).await.unwrap();
        let scope = RecipientScope::Society { society_id: "s1".into() };

        assert!(repo.mark_deleted_for_user(m.message_id, "b").await.unwrap());
        assert!(!repo.mark_deleted_for_user(m.message_id, "b").await.unwrap());

        assert!(repo.history(&scope, "b", None, None).await.unwrap().is_empty());
        assert_eq!(repo.history(&scope, "c", None, None).await.unwrap().len(), 1);
        assert_eq!(repo.hidden_for(m.message_id).await.unwrap(), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn delete_for_user_on_missing_message_is_not_found() {
        let repo = repo().await;
        let err = repo.mark_deleted_for_user(42, "b").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn delete_for_all_tombstones_permanently() {
        let repo = repo().await;
        let draft = SendMessageDTO {
            attachment: Some(Attachment {
                kind: AttachmentKind::Image,
                url: "http://media/x.png".into(),
            }),
            ..direct("b", "secret")
        };
        let m = repo.append(&user("a"), &draft).await.unwrap();

        let (deleted, changed) = repo.mark_deleted_for_all(m.message_id, &user("a")).await.unwrap();
        assert!(changed);
        assert!(deleted.deleted_for_all);
        assert_eq!(deleted.content, TOMBSTONE);
        assert!(deleted.attachment.is_none());

        let (again, changed) = repo.mark_deleted_for_all(m.message_id, &user("a")).await.unwrap();
        assert!(!changed);
        assert_eq!(again, deleted);

        let history = repo
            .history(&RecipientScope::Direct { peer_id: "a".into() }, "b", None, None)
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, TOMBSTONE);
        assert!(history[0].attachment.is_none());
    }

    #[tokio::test]
    async fn delete_for_all_by_other_user_is_refused() {
        let repo = repo().await;
        let m = repo.append(&user("a"), &direct("b", "keep me")).await.unwrap();
        let err = repo.mark_deleted_for_all(m.message_id, &user("b")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);
        let unchanged = repo.read(&m.message_id).await.unwrap().unwrap();
        assert_eq!(unchanged.content, "keep me");
        assert!(!unchanged.deleted_for_all);
    }

    #[tokio::test]
    async fn society_admin_can_delete_buzz_for_all() {
        let repo = repo().await;
        let m = repo.append(&user("a"), &public("spam")).await.unwrap();
        let mut admin = user("admin");
        admin.is_admin = true;
        let (deleted, changed) = repo.mark_deleted_for_all(m.message_id, &admin).await.unwrap();
        assert!(changed);
        assert_eq!(deleted.content, TOMBSTONE);
    }

    #[tokio::test]
    async fn concurrent_deletions_both_apply() {
        let repo = repo().await;
        let m = repo.append(&user("a"), &public("race")).await.unwrap();
        let a = user("a");
        let (hidden, all) = tokio::join!(
            repo.mark_deleted_for_user(m.message_id, "b"),
            repo.mark_deleted_for_all(m.message_id, &a)
        );
        assert!(hidden.unwrap());
        assert!(all.unwrap().1);
        let stored = repo.read(&m.message_id).await.unwrap().unwrap();
        assert!(stored.deleted_for_all);
        assert_eq!(repo.hidden_for(m.message_id).await.unwrap(), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn mark_seen_only_touches_peer_messages() {
        let repo = repo().await;
        repo.append(&user("a"), &direct("b", "one")).await.unwrap();
        repo.append(&user("a"), &direct("b", "two")).await.unwrap();
        repo.append(&user("b"), &direct("a", "reply")).await.unwrap();

        let (count, _) = repo.mark_seen("b", "a").await.unwrap();
        assert_eq!(count, 2);
        let (count, _) = repo.mark_seen("b", "a").await.unwrap();
        assert_eq!(count, 0);

        let thread = repo
            .history(&RecipientScope::Direct { peer_id: "a".into() }, "b", None, None)
            .await
            .unwrap();
        let seen: Vec<_> = thread.iter().map(|m| m.seen_at.is_some()).collect();
        assert_eq!(seen, vec![true, true, false]);
    }
}

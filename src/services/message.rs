//! Message services - Rotte HTTP per messaggi diretti e buzz
//!
//! Le scritture passano dal delivery coordinator: la risposta HTTP e l'evento live
//! contengono lo stesso `MessageDTO`.

use crate::core::{AppError, AppState, CurrentUser};
use crate::delivery::{self, DeletionOutcome};
use crate::dtos::{DeleteQuery, HistoryQuery, MessageDTO, SendMessageDTO};
use crate::entities::{Attachment, AttachmentKind, RecipientScope};
use axum::{
    Extension,
    body::Bytes,
    extract::{Json, Multipart, Path, Query, State},
    http::StatusCode,
};
use axum_macros::debug_handler;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use validator::Validate;

/// File ricevuto nel campo `file` del form multipart
struct UploadedFile {
    bytes: Bytes,
    mime_type: String,
    file_name: Option<String>,
}

/// Campi del form multipart per l'invio di un messaggio
#[derive(Default)]
struct MessageForm {
    content: String,
    group_id: Option<i64>,
    file: Option<UploadedFile>,
}

/// Un `group_id` vuoto indica il canale pubblico della society
fn parse_group_id(raw: &str) -> Result<Option<i64>, AppError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<i64>()
        .map(Some)
        .map_err(|_| AppError::validation("Invalid group identifier"))
}

async fn read_form(mut multipart: Multipart) -> Result<MessageForm, AppError> {
    let mut form = MessageForm::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "content" => form.content = field.text().await?,
            "group_id" => {
                let raw = field.text().await?;
                form.group_id = parse_group_id(&raw)?;
            }
            "file" => {
                let mime_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let file_name = field.file_name().map(str::to_string);
                let bytes = field.bytes().await?;
                if !bytes.is_empty() {
                    form.file = Some(UploadedFile {
                        bytes,
                        mime_type,
                        file_name,
                    });
                }
            }
            other => debug!(field = other, "Ignoring unknown multipart field"),
        }
    }

    Ok(form)
}

/// Crea un messaggio a partire dal form.
/// Validazione e autorizzazione avvengono prima dell'upload: un messaggio rifiutato
/// non carica nulla sul media storage.
async fn send_from_form(
    state: &AppState,
    sender: &CurrentUser,
    scope: RecipientScope,
    form: MessageForm,
) -> Result<MessageDTO, AppError> {
    let mut draft = SendMessageDTO {
        scope,
        content: form.content,
        attachment: None,
    };

    // 1. Validazione della bozza (lunghezza, contenuto vuoto solo con allegato)
    draft.validate()?;
    if form.file.is_none() && draft.content.trim().is_empty() {
        return Err(AppError::validation(
            "Message content may be empty only with an attachment",
        ));
    }

    // 2. Autorizzazione sullo scope
    delivery::authorize_scope(state, sender, &draft.scope).await?;

    // 3. Upload dell'allegato; un fallimento non crea il messaggio
    if let Some(file) = form.file {
        let kind = AttachmentKind::from_mime(&file.mime_type);
        let url = state
            .media
            .upload(file.bytes, &file.mime_type, file.file_name.as_deref())
            .await?;
        info!(kind = kind.as_str(), "Attachment uploaded");
        draft.attachment = Some(Attachment { kind, url });
    }

    // 4. Salvataggio e fan-out
    delivery::send_message(state, sender, draft).await
}

#[instrument(skip(state, current_user, query), fields(user_id = %current_user.user_id))]
pub async fn get_direct_messages(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<CurrentUser>,
    Path(peer_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<MessageDTO>>, AppError> {
    let scope = RecipientScope::Direct { peer_id };
    let messages = delivery::history(&state, &current_user, &scope, &query).await?;
    debug!(count = messages.len(), "Direct history loaded");
    Ok(Json(messages))
}

#[debug_handler]
#[instrument(skip(state, current_user, multipart), fields(user_id = %current_user.user_id))]
pub async fn send_direct_message(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<CurrentUser>,
    Path(peer_id): Path<String>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<MessageDTO>), AppError> {
    let form = read_form(multipart).await?;
    let message = send_from_form(
        &state,
        &current_user,
        RecipientScope::Direct { peer_id },
        form,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

#[instrument(skip(state, current_user, query), fields(user_id = %current_user.user_id))]
pub async fn get_buzz_messages(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<CurrentUser>,
    Path(society_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<MessageDTO>>, AppError> {
    let scope = match query.group_id {
        Some(group_id) => RecipientScope::Group {
            society_id,
            group_id,
        },
        None => RecipientScope::Society { society_id },
    };
    let messages = delivery::history(&state, &current_user, &scope, &query).await?;
    debug!(count = messages.len(), "Buzz history loaded");
    Ok(Json(messages))
}

#[debug_handler]
#[instrument(skip(state, current_user, multipart), fields(user_id = %current_user.user_id))]
pub async fn send_buzz_message(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<CurrentUser>,
    Path(society_id): Path<String>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<MessageDTO>), AppError> {
    let form = read_form(multipart).await?;
    let scope = match form.group_id {
        Some(group_id) => RecipientScope::Group {
            society_id,
            group_id,
        },
        None => RecipientScope::Society { society_id },
    };
    let message = send_from_form(&state, &current_user, scope, form).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

#[instrument(skip(state, current_user), fields(user_id = %current_user.user_id))]
pub async fn delete_message(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<CurrentUser>,
    Path(message_id): Path<i64>,
    Query(query): Query<DeleteQuery>,
) -> Result<Json<DeletionOutcome>, AppError> {
    let outcome = delivery::delete_message(&state, &current_user, message_id, query.mode).await?;
    Ok(Json(outcome))
}

#[derive(Serialize)]
pub struct SeenResponse {
    pub count: u64,
}

#[instrument(skip(state, current_user), fields(user_id = %current_user.user_id))]
pub async fn mark_direct_seen(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<CurrentUser>,
    Path(peer_id): Path<String>,
) -> Result<Json<SeenResponse>, AppError> {
    let count = delivery::mark_seen(&state, &current_user, &peer_id).await?;
    Ok(Json(SeenResponse { count }))
}

//! Delivery Coordinator - Punto unico per scritture che generano eventi live
//!
//! Sia le rotte HTTP sia il gateway WebSocket passano da qui: prima si autorizza lo scope,
//! poi si scrive nel message store e solo dopo una scrittura riuscita si notifica il canale live.
//! Il fan-out è best-effort e non fa mai fallire la richiesta.

use crate::core::{AppError, AppState, CurrentUser};
use crate::dtos::{HistoryQuery, MessageDTO, SendMessageDTO, ServerEvent, is_valid_identifier};
use crate::entities::{DeleteMode, Message, RecipientScope};
use crate::repositories::Read;
use crate::ws::rooms::Room;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Stanze (ed eventuale audience) a cui recapitare gli eventi di uno scope
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub rooms: Vec<Room>,
    pub audience: Option<Arc<BTreeSet<String>>>,
}

/// Esito di una cancellazione, restituito sia via HTTP sia usato dal gateway
#[derive(Debug, Clone, Serialize)]
pub struct DeletionOutcome {
    pub mode: DeleteMode,
    pub message_id: i64,
    pub changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<MessageDTO>,
}

/// Verifica che `user` possa leggere e scrivere nello scope e ne calcola il target.
///
/// - diretto: il peer deve essere un identificativo valido e diverso da `user`
/// - society: solo i residenti della stessa society
/// - gruppo: il gruppo deve esistere nella society e `user` deve esserne membro
#[instrument(skip(state, user), fields(user_id = %user.user_id, scope = ?scope.kind()))]
pub async fn authorize_scope(
    state: &AppState,
    user: &CurrentUser,
    scope: &RecipientScope,
) -> Result<Target, AppError> {
    match scope {
        RecipientScope::Direct { peer_id } => {
            if !is_valid_identifier(peer_id) {
                return Err(AppError::validation("Invalid peer identifier"));
            }
            if *peer_id == user.user_id {
                return Err(AppError::validation("Cannot send a direct message to yourself"));
            }
            Ok(Target {
                rooms: vec![Room::User(peer_id.clone()), Room::User(user.user_id.clone())],
                audience: None,
            })
        }
        RecipientScope::Society { society_id } => {
            if *society_id != user.society_id {
                warn!("Society scope outside of user society");
                return Err(AppError::forbidden("Not a resident of this society"));
            }
            Ok(Target {
                rooms: vec![Room::Society(society_id.clone())],
                audience: None,
            })
        }
        RecipientScope::Group {
            society_id,
            group_id,
        } => {
            if *society_id != user.society_id {
                warn!("Group scope outside of user society");
                return Err(AppError::forbidden("Not a resident of this society"));
            }
            let group = state
                .group
                .read(group_id)
                .await?
                .filter(|group| group.society_id == *society_id)
                .ok_or_else(|| AppError::not_found("Group not found"))?;
            if !group.is_member(&user.user_id) {
                warn!(group_id, "User is not a member of the group");
                return Err(AppError::forbidden("Not a member of this group"));
            }
            Ok(Target {
                rooms: vec![Room::Society(society_id.clone())],
                audience: Some(Arc::new(group.members)),
            })
        }
    }
}

/// Target per gli eventi che riguardano un messaggio già salvato.
/// Per i diretti le stanze sono quelle dei due partecipanti, indipendentemente da chi agisce.
async fn target_of(state: &AppState, message: &Message) -> Result<Target, AppError> {
    match &message.scope {
        RecipientScope::Direct { peer_id } => Ok(Target {
            rooms: vec![
                Room::User(message.sender_id.clone()),
                Room::User(peer_id.clone()),
            ],
            audience: None,
        }),
        RecipientScope::Society { society_id } => Ok(Target {
            rooms: vec![Room::Society(society_id.clone())],
            audience: None,
        }),
        RecipientScope::Group {
            society_id,
            group_id,
        } => {
            let members = state
                .group
                .read(group_id)
                .await?
                .map(|group| group.members)
                .unwrap_or_default();
            Ok(Target {
                rooms: vec![Room::Society(society_id.clone())],
                audience: Some(Arc::new(members)),
            })
        }
    }
}

/// Recapita un evento a tutte le stanze del target; restituisce il numero di receiver raggiunti
pub fn fan_out(state: &AppState, target: &Target, event: ServerEvent) -> usize {
    let reached: usize = target
        .rooms
        .iter()
        .map(|room| match room {
            Room::User(user_id) => state.rooms.emit_to_user(user_id, event.clone()),
            Room::Society(society_id) => {
                state
                    .rooms
                    .emit_to_society(society_id, event.clone(), target.audience.clone())
            }
            Room::Everyone => state.rooms.emit_to_everyone(event.clone()),
        })
        .sum();
    debug!(reached, "Event fanned out");
    reached
}

/// Invia un messaggio: validazione, autorizzazione, scrittura e poi un solo evento live.
/// Un messaggio rifiutato non viene salvato e non genera eventi.
#[instrument(skip(state, sender, draft), fields(sender_id = %sender.user_id))]
pub async fn send_message(
    state: &AppState,
    sender: &CurrentUser,
    draft: SendMessageDTO,
) -> Result<MessageDTO, AppError> {
    draft.check()?;
    let target = authorize_scope(state, sender, &draft.scope).await?;

    let message = MessageDTO::from(state.msg.append(sender, &draft).await?);
    info!(message_id = message.message_id, "Message stored");

    fan_out(state, &target, ServerEvent::MessageReceived(message.clone()));
    Ok(message)
}

/// Verifica che `user` sia tra i partecipanti del messaggio (può vederlo)
async fn ensure_participant(
    state: &AppState,
    user: &CurrentUser,
    message: &Message,
) -> Result<(), AppError> {
    let allowed = match &message.scope {
        RecipientScope::Direct { peer_id } => {
            message.sender_id == user.user_id || *peer_id == user.user_id
        }
        RecipientScope::Society { society_id } => *society_id == user.society_id,
        RecipientScope::Group {
            society_id,
            group_id,
        } => *society_id == user.society_id && state.group.is_member(*group_id, &user.user_id).await?,
    };

    if allowed {
        Ok(())
    } else {
        Err(AppError::forbidden("Not a participant of this conversation"))
    }
}

/// Cancella un messaggio.
///
/// - `ForMe`: lo nasconde solo a `requester`; nessun evento live
/// - `ForEveryone`: tombstone e un evento `message_deleted` ai partecipanti, solo se qualcosa
///   è cambiato (una seconda cancellazione non genera un nuovo evento)
#[instrument(skip(state, requester), fields(user_id = %requester.user_id))]
pub async fn delete_message(
    state: &AppState,
    requester: &CurrentUser,
    message_id: i64,
    mode: DeleteMode,
) -> Result<DeletionOutcome, AppError> {
    match mode {
        DeleteMode::ForMe => {
            let message = state
                .msg
                .read(&message_id)
                .await?
                .ok_or_else(|| AppError::not_found("Message not found"))?;
            ensure_participant(state, requester, &message).await?;

            let changed = state
                .msg
                .mark_deleted_for_user(message_id, &requester.user_id)
                .await?;
            Ok(DeletionOutcome {
                mode,
                message_id,
                changed,
                message: None,
            })
        }
        DeleteMode::ForEveryone => {
            let (message, changed) = state.msg.mark_deleted_for_all(message_id, requester).await?;

            if changed {
                match target_of(state, &message).await {
                    Ok(target) => {
                        fan_out(
                            state,
                            &target,
                            ServerEvent::MessageDeleted {
                                mode,
                                message_id,
                                message: Some(MessageDTO::from(message.clone())),
                            },
                        );
                    }
                    Err(e) => warn!("Deletion stored but not broadcast: {}", e),
                }
            }

            Ok(DeletionOutcome {
                mode,
                message_id,
                changed,
                message: Some(MessageDTO::from(message)),
            })
        }
    }
}

/// Segna come visti i messaggi di `peer_id` verso `reader` e avvisa il mittente
#[instrument(skip(state, reader), fields(user_id = %reader.user_id))]
pub async fn mark_seen(
    state: &AppState,
    reader: &CurrentUser,
    peer_id: &str,
) -> Result<u64, AppError> {
    if !is_valid_identifier(peer_id) || peer_id == reader.user_id {
        return Err(AppError::validation("Invalid peer identifier"));
    }

    let (count, seen_at) = state.msg.mark_seen(&reader.user_id, peer_id).await?;
    if count > 0 {
        state.rooms.emit_to_user(
            peer_id,
            ServerEvent::MessagesSeen {
                by: reader.user_id.clone(),
                count,
                seen_at,
            },
        );
    }
    Ok(count)
}

/// Storico di uno scope visibile a `requester`
#[instrument(skip(state, requester, query), fields(user_id = %requester.user_id))]
pub async fn history(
    state: &AppState,
    requester: &CurrentUser,
    scope: &RecipientScope,
    query: &HistoryQuery,
) -> Result<Vec<MessageDTO>, AppError> {
    authorize_scope(state, requester, scope).await?;
    let messages = state
        .msg
        .history(scope, &requester.user_id, query.before.as_ref(), query.limit)
        .await?;
    Ok(messages.into_iter().map(MessageDTO::from).collect())
}

//! WebSocket Event Handlers - Handler per eventi WebSocket
//!
//! Gli eventi di una sessione vengono processati uno alla volta, nell'ordine di arrivo.
//! Un errore viene inviato solo alla sessione che lo ha generato e non chiude la connessione.

use crate::core::{AppError, AppState, authenticate};
use crate::delivery;
use crate::dtos::{ClientEvent, SendMessageDTO, ServerEvent};
use crate::entities::DeleteMode;
use crate::ws::rooms::Room;
use crate::ws::session::{InternalSignal, Session};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, instrument, warn};

/// Invia un evento solo a questa sessione
fn send_to_session(outbox: &UnboundedSender<InternalSignal>, event: ServerEvent) {
    if outbox.send(InternalSignal::Event(event)).is_err() {
        debug!("Writer task gone, event for session dropped");
    }
}

/// Decodifica un frame di testo e lo processa.
/// Un frame malformato produce un errore di validazione per la sola sessione.
pub async fn process_frame(
    state: &AppState,
    session: &mut Session,
    outbox: &UnboundedSender<InternalSignal>,
    text: &str,
) {
    match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => process_event(state, session, outbox, event).await,
        Err(e) => {
            warn!("Failed to deserialize client event: {}", e);
            send_to_session(outbox, ServerEvent::from(&AppError::from(e)));
        }
    }
}

#[instrument(skip(state, session, outbox, event), fields(session_id = session.id(), event = event.name()))]
pub async fn process_event(
    state: &AppState,
    session: &mut Session,
    outbox: &UnboundedSender<InternalSignal>,
    event: ClientEvent,
) {
    let result = match event {
        ClientEvent::Identify { token } => handle_identify(state, session, outbox, &token),
        ClientEvent::SendMessage(draft) => handle_send_message(state, session, draft).await,
        ClientEvent::DeleteMessage { message_id, mode } => {
            handle_delete_message(state, session, outbox, message_id, mode).await
        }
        ClientEvent::MarkSeen { peer_id } => {
            handle_mark_seen(state, session, &peer_id).await;
            Ok(())
        }
    };

    if let Err(err) = result {
        warn!(error = %err, "Event rejected");
        send_to_session(outbox, ServerEvent::from(&err));
    }
}

/// Identify: verifica il token, iscrive la sessione alle sue stanze e la rende visibile
/// nella presenza. Le stanze vengono create prima di pubblicare la presenza, così la sessione
/// riceve anche la propria notifica.
fn handle_identify(
    state: &AppState,
    session: &mut Session,
    outbox: &UnboundedSender<InternalSignal>,
    token: &str,
) -> Result<(), AppError> {
    if session.identity().is_some() {
        return Err(AppError::validation("Session already identified"));
    }
    let user = authenticate(token, &state.jwt_secret)?;
    session.identify(user.clone())?;

    let rooms = vec![
        (Room::Everyone, state.rooms.join(Room::Everyone)),
        state.rooms.join_user_room(&user.user_id),
        state.rooms.join_society_room(&user.society_id),
    ];
    if outbox
        .send(InternalSignal::Subscribe {
            user_id: user.user_id.clone(),
            rooms,
        })
        .is_err()
    {
        debug!("Writer task gone before subscription");
    }

    state
        .presence
        .connect_with(&user.user_id, session.id(), |change| {
            state
                .rooms
                .emit_to_everyone(ServerEvent::PresenceChanged(change));
        });

    session.activate()?;
    info!(user_id = %user.user_id, "Session active");

    send_to_session(
        outbox,
        ServerEvent::Identified {
            user_id: user.user_id,
            society_id: user.society_id,
            session_id: session.id(),
        },
    );
    send_to_session(outbox, ServerEvent::PresenceSnapshot(state.presence.snapshot()));
    Ok(())
}

async fn handle_send_message(
    state: &AppState,
    session: &Session,
    draft: SendMessageDTO,
) -> Result<(), AppError> {
    let sender = session.require_identified()?;
    // la conferma al mittente arriva dalla sua stanza utente / society
    delivery::send_message(state, sender, draft).await?;
    Ok(())
}

async fn handle_delete_message(
    state: &AppState,
    session: &Session,
    outbox: &UnboundedSender<InternalSignal>,
    message_id: i64,
    mode: DeleteMode,
) -> Result<(), AppError> {
    let requester = session.require_active()?;
    let outcome = delivery::delete_message(state, requester, message_id, mode).await?;

    if mode == DeleteMode::ForMe {
        send_to_session(
            outbox,
            ServerEvent::MessageDeleted {
                mode,
                message_id: outcome.message_id,
                message: None,
            },
        );
    }
    Ok(())
}

/// Best-effort: un fallimento viene solo loggato
async fn handle_mark_seen(state: &AppState, session: &Session, peer_id: &str) {
    let Ok(reader) = session.require_identified() else {
        debug!("Mark seen ignored for unidentified session");
        return;
    };
    match delivery::mark_seen(state, reader, peer_id).await {
        Ok(count) => debug!(count, "Messages marked as seen"),
        Err(e) => warn!("Mark seen failed: {}", e),
    }
}

/// Chiusura della sessione: rimuove la sessione dalla presenza una sola volta
#[instrument(skip(state, session), fields(session_id = session.id()))]
pub fn handle_disconnect(state: &AppState, session: &mut Session) {
    let Some(user) = session.disconnect() else {
        debug!("Session closed before identify");
        return;
    };
    state
        .presence
        .disconnect_with(&user.user_id, session.id(), |change| {
            state
                .rooms
                .emit_to_everyone(ServerEvent::PresenceChanged(change));
        });
    info!(user_id = %user.user_id, "Session disconnected");
}

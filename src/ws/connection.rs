//! WebSocket Connection Management - Gestione connessioni WebSocket

use crate::ws::RATE_LIMITER_MILLIS;
use crate::ws::event_handlers::{handle_disconnect, process_frame};
use crate::ws::rooms::{Envelope, Room};
use crate::ws::session::{InternalSignal, Session, SessionId, next_session_id};
use crate::{AppError, AppState, dtos::ServerEvent};
use axum::extract::ws::{Message, Utf8Bytes, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::time::{Duration, interval, timeout};
use tokio_stream::StreamMap;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::{debug, error, info, instrument, warn};

pub async fn handle_socket(ws: WebSocket, state: Arc<AppState>) {
    let session_id = next_session_id();
    info!(session_id, "WebSocket connection established");

    // Dividiamo il WebSocket in due metà: sender e receiver
    let (ws_tx, ws_rx) = ws.split();

    // Canale interno listener -> writer della stessa sessione
    let (int_tx, int_rx) = unbounded_channel::<InternalSignal>();

    tokio::spawn(listen_ws(session_id, ws_rx, int_tx, state.clone()));
    tokio::spawn(write_ws(session_id, ws_tx, int_rx, state));
}

async fn send_event(
    websocket_tx: &mut SplitSink<WebSocket, Message>,
    event: &ServerEvent,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(event).map_err(|e| {
        error!("Failed to serialize event: {:?}", e);
        axum::Error::new(e)
    })?;
    websocket_tx.send(Message::Text(Utf8Bytes::from(json))).await
}

/// Task di scrittura: unisce gli eventi delle stanze (dopo identify) e quelli diretti alla sessione
#[instrument(skip(websocket_tx, internal_rx, state))]
pub async fn write_ws(
    session_id: SessionId,
    mut websocket_tx: SplitSink<WebSocket, Message>,
    mut internal_rx: UnboundedReceiver<InternalSignal>,
    state: Arc<AppState>,
) {
    debug!("Write task started");

    let mut stream_map: StreamMap<Room, BroadcastStream<Arc<Envelope>>> = StreamMap::new();
    let mut user_id = String::new();

    'external: loop {
        tokio::select! {
            Some((room, result)) = tokio_stream::StreamExt::next(&mut stream_map) => {
                match result {
                    Ok(envelope) => {
                        if !envelope.admits(&user_id) {
                            continue 'external;
                        }
                        if send_event(&mut websocket_tx, &envelope.event).await.is_err() {
                            warn!("Failed to send event, closing connection");
                            break 'external;
                        }
                    }
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        warn!(room = %room, skipped, "Session lagging behind, events skipped");
                    }
                }
            }

            signal = internal_rx.recv() => {
                match signal {
                    Some(InternalSignal::Subscribe { user_id: id, rooms }) => {
                        info!(user_id = %id, rooms = rooms.len(), "Subscribing session to rooms");
                        user_id = id;
                        for (room, rx) in rooms {
                            stream_map.insert(room, BroadcastStream::new(rx));
                        }
                    }
                    Some(InternalSignal::Event(event)) => {
                        if send_event(&mut websocket_tx, &event).await.is_err() {
                            warn!("Failed to send event, closing connection");
                            break 'external;
                        }
                    }
                    Some(InternalSignal::Shutdown) => {
                        debug!("Shutdown signal received");
                        break 'external;
                    }
                    None => {
                        debug!("Internal channel closed");
                        break 'external;
                    }
                }
            }
        }
    }

    let _ = websocket_tx.close().await;

    // prima si rilasciano i receiver, poi le stanze rimaste vuote vengono rimosse
    let joined: Vec<Room> = stream_map.keys().cloned().collect();
    drop(stream_map);
    for room in &joined {
        state.rooms.leave(room);
    }
    debug!(rooms = state.rooms.room_count(), "Write task terminated");
}

/// Task di lettura: un frame alla volta, nell'ordine di arrivo
#[instrument(skip(websocket_rx, internal_tx, state))]
pub async fn listen_ws(
    session_id: SessionId,
    mut websocket_rx: SplitStream<WebSocket>,
    internal_tx: UnboundedSender<InternalSignal>,
    state: Arc<AppState>,
) {
    debug!("Listen task started");

    let mut session = Session::new(session_id);
    let mut rate_limiter = interval(Duration::from_millis(RATE_LIMITER_MILLIS));
    let idle_timeout = state.ws_idle_timeout;

    loop {
        match timeout(idle_timeout, StreamExt::next(&mut websocket_rx)).await {
            Ok(Some(msg_result)) => {
                rate_limiter.tick().await;

                let msg = match msg_result {
                    Ok(m) => m,
                    Err(e) => {
                        warn!("WebSocket error: {:?}", e);
                        break;
                    }
                };

                match msg {
                    Message::Text(text) => {
                        process_frame(&state, &mut session, &internal_tx, text.as_str()).await;
                    }
                    Message::Binary(_) => {
                        let err = AppError::validation("Binary frames are not supported");
                        let _ = internal_tx.send(InternalSignal::Event(ServerEvent::from(&err)));
                    }
                    Message::Close(_) => {
                        info!("Close message received");
                        break;
                    }
                    _ => {}
                }
            }
            Ok(None) => {
                info!("WebSocket stream ended");
                break;
            }
            Err(_) => {
                warn!(timeout_secs = idle_timeout.as_secs(), "Connection idle timeout");
                break;
            }
        }
    }

    // Cleanup
    handle_disconnect(&state, &mut session);
    let _ = internal_tx.send(InternalSignal::Shutdown);
    debug!("Listen task terminated");
}

//! WebSocket Module - Live Channel Gateway
//!
//! Questo modulo gestisce le connessioni WebSocket per la comunicazione in tempo reale
//! tra client e server. Include:
//! - Gestione upgrade HTTP -> WebSocket
//! - Ciclo di vita della sessione (connecting, identified, active, disconnected)
//! - Presenza degli utenti e stanze di broadcast
//! - Handler per eventi in ingresso

pub mod connection;
pub mod event_handlers;
pub mod presence;
pub mod rooms;
pub mod session;

// Re-exports pubblici
pub use connection::handle_socket;
pub use presence::PresenceTracker;
pub use rooms::{Envelope, Room, RoomRouter};

use crate::AppState;
use axum::{
    extract::{State, ws::WebSocketUpgrade},
    response::Response,
};
use std::sync::Arc;

/// Eventi bufferizzati per stanza prima che un receiver lento inizi a perderli
pub const BROADCAST_CHANNEL_CAPACITY: usize = 256;
/// Intervallo minimo tra due frame processati della stessa sessione
pub const RATE_LIMITER_MILLIS: u64 = 5;

/// Entry point per gestire richieste di upgrade WebSocket.
/// L'identità non arriva dall'header: la sessione si identifica con l'evento `identify`.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws
        // Possibile limitazione dei buffer, default 128 KB
        //.read_buffer_size(4*1024)
        //.write_buffer_size(16*1024)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

//! Services module - Coordinatore per tutti i service handler HTTP
//!
//! Questo modulo organizza i service handlers in sotto-moduli separati per una migliore manutenibilità.
//! Ogni modulo gestisce gli endpoint HTTP per una specifica funzionalità.

pub mod group;
pub mod message;
pub mod presence;

// Re-exports per facilitare l'import
pub use group::{create_group, list_groups};
pub use message::{
    delete_message, get_buzz_messages, get_direct_messages, mark_direct_seen, send_buzz_message,
    send_direct_message,
};
pub use presence::get_presence;

use crate::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse};
use std::sync::Arc;

/// Root endpoint - health check
pub async fn root(State(_state): State<Arc<AppState>>) -> impl IntoResponse {
    (StatusCode::OK, "Server is running!")
}

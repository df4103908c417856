//! Presence services - Stato online degli utenti via HTTP

use crate::core::AppState;
use crate::dtos::PresenceDTO;
use axum::extract::{Json, State};
use std::sync::Arc;

pub async fn get_presence(State(state): State<Arc<AppState>>) -> Json<Vec<PresenceDTO>> {
    Json(state.presence.snapshot())
}

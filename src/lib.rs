//! Server library - espone i moduli principali per i test

pub mod core;
pub mod delivery;
pub mod dtos;
pub mod entities;
pub mod media;
pub mod repositories;
pub mod services;
pub mod ws;

// Re-export dei tipi principali per facilitare l'import
pub use core::{AppError, AppState, auth, config};
pub use services::root;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{any, delete, get, post},
};
use std::sync::Arc;

/// Crea il router principale dell'applicazione
pub fn create_router(state: Arc<AppState>) -> Router {
    use services::*;
    use ws::ws_handler;

    Router::new()
        .route("/", get(root))
        // l'identità arriva con l'evento `identify`, non dall'header
        .route("/ws", any(ws_handler))
        .nest("/direct", configure_direct_routes(state.clone()))
        .nest("/buzz", configure_buzz_routes(state.clone()))
        .nest("/messages", configure_message_routes(state.clone()))
        .nest("/presence", configure_presence_routes(state.clone()))
        .with_state(state)
}

/// Configura le routes per i messaggi diretti
fn configure_direct_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    use core::authentication_middleware;
    use services::*;

    Router::new()
        .route(
            "/{peer_id}/messages",
            get(get_direct_messages).post(send_direct_message),
        )
        .route("/{peer_id}/seen", post(mark_direct_seen))
        .layer(DefaultBodyLimit::max(state.max_upload_bytes))
        .layer(middleware::from_fn_with_state(
            state,
            authentication_middleware,
        ))
}

/// Configura le routes per i buzz di society e i gruppi
fn configure_buzz_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    use core::authentication_middleware;
    use services::*;

    Router::new()
        .route(
            "/{society_id}/messages",
            get(get_buzz_messages).post(send_buzz_message),
        )
        .route(
            "/{society_id}/groups",
            get(list_groups).post(create_group),
        )
        .layer(DefaultBodyLimit::max(state.max_upload_bytes))
        .layer(middleware::from_fn_with_state(
            state,
            authentication_middleware,
        ))
}

/// Configura le routes per operazioni sul singolo messaggio
fn configure_message_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    use core::authentication_middleware;
    use services::*;

    Router::new()
        .route("/{message_id}", delete(delete_message))
        .layer(middleware::from_fn_with_state(
            state,
            authentication_middleware,
        ))
}

/// Configura le routes per la presenza
fn configure_presence_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    use core::authentication_middleware;
    use services::*;

    Router::new()
        .route("/", get(get_presence))
        .layer(middleware::from_fn_with_state(
            state,
            authentication_middleware,
        ))
}

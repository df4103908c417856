//! Core Module - Componenti infrastrutturali dell'applicazione
//!
//! Questo modulo contiene tutti i componenti "core" dell'applicazione:
//! - Identità e JWT
//! - Configurazione
//! - Gestione errori
//! - Stato applicazione

pub mod auth;
pub mod config;
pub mod error;
pub mod state;

// Re-exports per facilitare l'import
pub use auth::{CurrentUser, authenticate, authentication_middleware, decode_jwt, encode_jwt, Claims};
pub use config::Config;
pub use error::{AppError, ErrorKind};
pub use state::AppState;

//! Application State - Stato globale dell'applicazione
//!
//! Contiene i repository, i collaboratori esterni e lo stato condiviso del canale live
//! (presenza e stanze) necessari per gestire l'applicazione.

use crate::media::MediaStorage;
use crate::repositories::{GroupRepository, MessageRepository};
use crate::ws::presence::PresenceTracker;
use crate::ws::rooms::RoomRouter;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;

/// Stato globale dell'applicazione condiviso tra tutte le route, middleware e sessioni WebSocket
pub struct AppState {
    /// Message store: messaggi diretti e buzz
    pub msg: MessageRepository,

    /// Repository per i gruppi buzz
    pub group: GroupRepository,

    /// Collaboratore esterno per il caricamento degli allegati
    pub media: Arc<dyn MediaStorage>,

    /// Secret key per JWT token
    pub jwt_secret: String,

    /// Utenti online e sessioni attive per utente
    pub presence: PresenceTracker,

    /// Stanze di broadcast (utente, society, globale)
    pub rooms: RoomRouter,

    /// Dopo quanto tempo senza frame in ingresso una connessione viene chiusa
    pub ws_idle_timeout: Duration,

    /// Dimensione massima di un upload multipart
    pub max_upload_bytes: usize,
}

impl AppState {
    /// Crea una nuova istanza di AppState inizializzando tutti i repository
    /// con il pool di connessioni fornito.
    ///
    /// # Arguments
    /// * `pool` - Pool di connessioni SQLite condiviso
    /// * `jwt_secret` - Chiave segreta per la verifica dei token JWT
    /// * `media` - Implementazione del media storage
    pub fn new(pool: SqlitePool, jwt_secret: String, media: Arc<dyn MediaStorage>) -> Self {
        Self {
            msg: MessageRepository::new(pool.clone()),
            group: GroupRepository::new(pool),
            media,
            jwt_secret,
            presence: PresenceTracker::new(),
            rooms: RoomRouter::new(),
            ws_idle_timeout: Duration::from_secs(300),
            max_upload_bytes: 25 * 1024 * 1024,
        }
    }

    pub fn with_ws_idle_timeout(mut self, timeout: Duration) -> Self {
        self.ws_idle_timeout = timeout;
        self
    }

    pub fn with_max_upload_bytes(mut self, max_upload_bytes: usize) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self
    }
}

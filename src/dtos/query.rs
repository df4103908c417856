//! Query DTOs - Data Transfer Objects per query string

use crate::entities::DeleteMode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Massimo numero di messaggi restituibili in una singola pagina di storico
pub const MAX_HISTORY_LIMIT: i64 = 500;

/// DTO per query parameters dello storico messaggi
#[derive(Serialize, Deserialize, Debug, Default, Clone)]
pub struct HistoryQuery {
    /// Solo per lo storico buzz: restringe lo storico al gruppo indicato
    #[serde(default)]
    pub group_id: Option<i64>,
    /// Restituisce solo messaggi creati prima di questo istante (escluso)
    #[serde(default)]
    pub before: Option<DateTime<Utc>>,
    /// Restituisce al massimo gli ultimi `limit` messaggi, sempre dal più vecchio
    #[serde(default)]
    pub limit: Option<i64>,
}

/// DTO per la modalità di cancellazione di un messaggio
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DeleteQuery {
    pub mode: DeleteMode,
}

//! Presence DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PresenceDTO {
    pub user_id: String,
    pub is_online: bool,
    // significativo solo quando l'utente è offline
    pub last_seen: Option<DateTime<Utc>>,
}

//! Group entity - Gruppo buzz all'interno di una society

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Group {
    pub group_id: i64,
    pub name: String,
    pub society_id: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    // l'appartenenza non cambia dopo la creazione
    pub members: BTreeSet<String>,
}

impl Group {
    pub fn is_member(&self, user_id: &str) -> bool {
        self.members.contains(user_id)
    }
}

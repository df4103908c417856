//! Group DTOs - Data Transfer Objects per i gruppi buzz

use crate::entities::Group;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct GroupDTO {
    pub group_id: i64,
    pub name: String,
    pub society_id: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub members: Vec<String>,
}

impl From<Group> for GroupDTO {
    fn from(value: Group) -> Self {
        Self {
            group_id: value.group_id,
            name: value.name,
            society_id: value.society_id,
            created_by: value.created_by,
            created_at: value.created_at,
            members: value.members.into_iter().collect(),
        }
    }
}

/// DTO per creare un nuovo gruppo (il creatore viene aggiunto implicitamente ai membri)
#[derive(Serialize, Deserialize, Debug, Clone, Validate)]
pub struct CreateGroupDTO {
    #[validate(length(min = 1, max = 100, message = "Group name must be between 1 and 100 characters"))]
    pub name: String,

    #[serde(default)]
    #[validate(length(max = 500, message = "A group can have at most 500 initial members"))]
    pub members: Vec<String>,
}

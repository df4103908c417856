//! Group services - Gruppi buzz all'interno di una society

use crate::core::{AppError, AppState, CurrentUser};
use crate::dtos::{CreateGroupDTO, GroupDTO, is_valid_identifier};
use crate::repositories::{Create, NewGroup};
use axum::{
    Extension,
    extract::{Json, Path, State},
    http::StatusCode,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use validator::Validate;

fn ensure_resident(current_user: &CurrentUser, society_id: &str) -> Result<(), AppError> {
    if current_user.society_id != society_id {
        warn!("Access to groups of another society");
        return Err(AppError::forbidden("Not a resident of this society"));
    }
    Ok(())
}

#[instrument(skip(state, current_user), fields(user_id = %current_user.user_id))]
pub async fn list_groups(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<CurrentUser>,
    Path(society_id): Path<String>,
) -> Result<Json<Vec<GroupDTO>>, AppError> {
    ensure_resident(&current_user, &society_id)?;
    let groups = state.group.find_many_by_society(&society_id).await?;
    Ok(Json(groups.into_iter().map(GroupDTO::from).collect()))
}

#[instrument(skip(state, current_user, body), fields(user_id = %current_user.user_id))]
pub async fn create_group(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<CurrentUser>,
    Path(society_id): Path<String>,
    Json(body): Json<CreateGroupDTO>,
) -> Result<(StatusCode, Json<GroupDTO>), AppError> {
    // 1. Il creatore deve appartenere alla society
    ensure_resident(&current_user, &society_id)?;

    // 2. Validazione del body
    body.validate()?;
    let name = body.name.trim();
    if name.is_empty() {
        return Err(AppError::validation("Group name must not be empty"));
    }
    if body.members.iter().any(|m| !is_valid_identifier(m)) {
        return Err(AppError::validation("Invalid member identifier"));
    }

    // 3. Il creatore è sempre membro
    let mut members: BTreeSet<String> = body.members.into_iter().collect();
    members.insert(current_user.user_id.clone());

    let group = state
        .group
        .create(&NewGroup {
            name: name.to_string(),
            society_id,
            created_by: current_user.user_id.clone(),
            members,
        })
        .await?;

    info!(group_id = group.group_id, "Group created");
    Ok((StatusCode::CREATED, Json(GroupDTO::from(group))))
}

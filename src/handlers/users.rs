use crate::core::error::ApiError;
use crate::core::state::AppState;
use crate::directory::key_directory::ProfileUpdate;
use crate::models::admin::{
    AddSshKeyRequest, DataResponse, MutationResponse, RemoveSshKeyRequest, UpdateUserRequest,
};
use crate::models::user::User;
use crate::utils::auth::AdminKey;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use std::sync::Arc;

type UserMutation = Result<Json<MutationResponse<User>>, ApiError>;

pub(crate) fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|e| ApiError::InvalidParameter(e.body_text()))
}

/// GET /api/v1/users
pub async fn list_users_handler(
    _: AdminKey,
    State(state): State<Arc<AppState>>,
) -> Result<Json<DataResponse<Vec<User>>>, ApiError> {
    state.ensure_ready()?;
    Ok(Json(DataResponse::new(state.store.list_users().await)))
}

/// GET /api/v1/users/{id}
pub async fn get_user_handler(
    _: AdminKey,
    State(state): State<Arc<AppState>>,
    Path(id): Path<u32>,
) -> Result<Json<DataResponse<User>>, ApiError> {
    state.ensure_ready()?;
    let user = state
        .store
        .get_user(id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("User {} not found", id)))?;

    Ok(Json(DataResponse::new(user)))
}

/// PATCH /api/v1/users/{id}
///
/// Body: `{"name"?: string, "isActive"?: bool, "isSystemAdmin"?: bool}`
pub async fn update_user_handler(
    _: AdminKey,
    State(state): State<Arc<AppState>>,
    Path(id): Path<u32>,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> UserMutation {
    let request = body(payload)?;

    let committed = state
        .directory
        .update_profile(
            id,
            ProfileUpdate {
                name: request.name,
                is_active: request.is_active,
                is_system_admin: request.is_system_admin,
            },
        )
        .await?;

    Ok(Json(committed.into()))
}

/// POST /api/v1/users/{id}/keys
///
/// Body: `{"publicKey": "<openssh public key line>"}`
pub async fn add_key_handler(
    _: AdminKey,
    State(state): State<Arc<AppState>>,
    Path(id): Path<u32>,
    payload: Result<Json<AddSshKeyRequest>, JsonRejection>,
) -> UserMutation {
    let request = body(payload)?;
    let committed = state.directory.add_ssh_key(id, &request.public_key).await?;
    Ok(Json(committed.into()))
}

/// POST /api/v1/users/{id}/keys/remove
///
/// Body: `{"fingerprint": "SHA256:..."}`
pub async fn remove_key_handler(
    _: AdminKey,
    State(state): State<Arc<AppState>>,
    Path(id): Path<u32>,
    payload: Result<Json<RemoveSshKeyRequest>, JsonRejection>,
) -> UserMutation {
    let request = body(payload)?;
    let committed = state
        .directory
        .remove_ssh_key(id, &request.fingerprint)
        .await?;
    Ok(Json(committed.into()))
}

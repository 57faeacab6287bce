use crate::core::error::ApiError;
use crate::core::state::AppState;
use crate::handlers::users::body;
use crate::models::admin::{
    AssignUsersRequest, DataResponse, MutationResponse, RemoveServerUserRequest, ServerView,
};
use crate::models::server::Server;
use crate::utils::auth::AdminKey;
use crate::utils::time::relative_time;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

fn view(server: Server, now: DateTime<Utc>) -> ServerView {
    ServerView {
        last_seen: relative_time(server.last_heartbeat_on, now),
        server,
    }
}

/// GET /api/v1/servers
pub async fn list_servers_handler(
    _: AdminKey,
    State(state): State<Arc<AppState>>,
) -> Result<Json<DataResponse<Vec<ServerView>>>, ApiError> {
    state.ensure_ready()?;
    let now = Utc::now();
    let servers = state
        .store
        .list_servers()
        .await
        .into_iter()
        .map(|server| view(server, now))
        .collect();

    Ok(Json(DataResponse::new(servers)))
}

/// GET /api/v1/servers/{id}
pub async fn get_server_handler(
    _: AdminKey,
    State(state): State<Arc<AppState>>,
    Path(id): Path<u32>,
) -> Result<Json<DataResponse<ServerView>>, ApiError> {
    state.ensure_ready()?;
    let server = state
        .store
        .get_server(id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Server {} not found", id)))?;

    Ok(Json(DataResponse::new(view(server, Utc::now()))))
}

/// POST /api/v1/servers/{id}/users
///
/// Body: `{"userIds": [1, 2]}`
pub async fn assign_users_handler(
    _: AdminKey,
    State(state): State<Arc<AppState>>,
    Path(id): Path<u32>,
    payload: Result<Json<AssignUsersRequest>, JsonRejection>,
) -> Result<Json<MutationResponse<Server>>, ApiError> {
    let request = body(payload)?;
    if request.user_ids.is_empty() {
        return Err(ApiError::InvalidParameter("No users selected".to_string()));
    }

    let committed = state.directory.assign_users(id, &request.user_ids).await?;
    Ok(Json(committed.into()))
}

/// POST /api/v1/servers/{id}/users/remove
///
/// Body: `{"userId": 1}`
pub async fn remove_user_handler(
    _: AdminKey,
    State(state): State<Arc<AppState>>,
    Path(id): Path<u32>,
    payload: Result<Json<RemoveServerUserRequest>, JsonRejection>,
) -> Result<Json<MutationResponse<Server>>, ApiError> {
    let request = body(payload)?;
    let committed = state
        .directory
        .remove_user_from_server(id, request.user_id)
        .await?;
    Ok(Json(committed.into()))
}

// HTTP routes configuration

use crate::core::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Public endpoints
        .route("/health", get(crate::handlers::health::health_handler))
        .route("/api/v1/server/keys", get(crate::handlers::server_keys::server_keys_handler))
        .route(
            "/api/v1/stream",
            get(crate::handlers::stream::stream_handler).post(crate::handlers::stream::stream_handler),
        )

        // Admin endpoints (require API key)
        .route("/metrics", get(crate::handlers::metrics::metrics_handler))
        .route("/api/v1/users", get(crate::handlers::users::list_users_handler))
        .route(
            "/api/v1/users/{id}",
            get(crate::handlers::users::get_user_handler).patch(crate::handlers::users::update_user_handler),
        )
        .route("/api/v1/users/{id}/keys", post(crate::handlers::users::add_key_handler))
        .route("/api/v1/users/{id}/keys/remove", post(crate::handlers::users::remove_key_handler))
        .route("/api/v1/servers", get(crate::handlers::servers::list_servers_handler))
        .route("/api/v1/servers/{id}", get(crate::handlers::servers::get_server_handler))
        .route("/api/v1/servers/{id}/users", post(crate::handlers::servers::assign_users_handler))
        .route("/api/v1/servers/{id}/users/remove", post(crate::handlers::servers::remove_user_handler))

        // 404 fallback for all unmatched routes
        .fallback(crate::handlers::fallback::fallback_handler)

        .with_state(state)
}

use crate::core::error::ApiError;
use axum::{
    http::Uri,
    response::{IntoResponse, Response},
};

pub async fn fallback_handler(uri: Uri) -> Response {
    ApiError::NotFound(format!(
        "No route for {}. Valid endpoints: /health, /api/v1/server/keys, /api/v1/stream",
        uri.path()
    ))
    .into_response()
}

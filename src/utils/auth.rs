use crate::core::error::ApiError;
use crate::core::state::AppState;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Verify API key using constant-time comparison to prevent timing attacks
pub fn verify_api_key(provided: &str, expected: &str) -> bool {
    provided.as_bytes().len() == expected.as_bytes().len()
        && provided
            .as_bytes()
            .iter()
            .zip(expected.as_bytes().iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

#[derive(Deserialize)]
struct ApiKeyQuery {
    api_key: Option<String>,
}

/// Guard for admin routes.
///
/// Accepts the key from the `x-api-key` header or the `api_key` query parameter.
pub struct AdminKey;

impl FromRequestParts<Arc<AppState>> for AdminKey {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let from_header = parts
            .headers
            .get(API_KEY_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let provided = from_header.or_else(|| {
            parts
                .uri
                .query()
                .and_then(|query| serde_urlencoded::from_str::<ApiKeyQuery>(query).ok())
                .and_then(|query| query.api_key)
        });

        match provided {
            Some(key) if verify_api_key(&key, &state.config.admin.api_key) => Ok(AdminKey),
            _ => {
                warn!(path = %parts.uri.path(), "Unauthorized admin request");
                Err(ApiError::InvalidApiKey)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::tests::test_state;
    use axum::http::Request;

    async fn extract(request: Request<()>) -> Result<AdminKey, ApiError> {
        let (state, _dir) = test_state().await;
        let (mut parts, _) = request.into_parts();
        AdminKey::from_request_parts(&mut parts, &state).await
    }

    #[test]
    fn test_verify_api_key_valid() {
        assert!(verify_api_key("test-key", "test-key"));
    }

    #[test]
    fn test_verify_api_key_invalid() {
        assert!(!verify_api_key("wrong-key", "test-key"));
    }

    #[test]
    fn test_verify_api_key_different_length() {
        assert!(!verify_api_key("short", "much-longer-key"));
    }

    #[test]
    fn test_verify_api_key_case_sensitive() {
        assert!(!verify_api_key("Test-Key", "test-key"));
    }

    #[tokio::test]
    async fn test_header_key_accepted() {
        let request = Request::builder()
            .uri("/api/v1/users")
            .header(API_KEY_HEADER, "test-api-key")
            .body(())
            .unwrap();
        assert!(extract(request).await.is_ok());
    }

    #[tokio::test]
    async fn test_query_key_accepted() {
        let request = Request::builder()
            .uri("/metrics?api_key=test-api-key")
            .body(())
            .unwrap();
        assert!(extract(request).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_or_wrong_key_rejected() {
        let missing = Request::builder().uri("/api/v1/users").body(()).unwrap();
        assert!(matches!(extract(missing).await, Err(ApiError::InvalidApiKey)));

        let wrong = Request::builder()
            .uri("/api/v1/users?api_key=nope")
            .body(())
            .unwrap();
        assert!(matches!(extract(wrong).await, Err(ApiError::InvalidApiKey)));
    }
}

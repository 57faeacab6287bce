// Metrics endpoint

use crate::core::state::AppState;
use crate::metrics::collector::MetricsSnapshot;
use crate::utils::auth::AdminKey;
use axum::{extract::State, Json};
use std::sync::Arc;

/// Returns JSON with service statistics:
/// - Heartbeats received and servers registered
/// - Broadcasts sent and deliveries that failed
/// - Failed write-backs, record counts, and store status
/// - Connected stream subscribers and uptime
///
/// Requires valid API key for authentication.
pub async fn metrics_handler(
    _: AdminKey,
    State(state): State<Arc<AppState>>,
) -> Json<MetricsSnapshot> {
    Json(
        state
            .metrics
            .get_snapshot(&state.store, &state.broadcast)
            .await,
    )
}

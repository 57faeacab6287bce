use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::core::state::AppState;

// this runs at boot time, before the listener is bound
pub async fn load_store(state: &AppState) -> Result<()> {
    match state.store.load().await {
        Ok(()) => {
            info!(
                users = state.store.user_count().await,
                servers = state.store.server_count().await,
                "Record store ready"
            );
            Ok(())
        }
        Err(e) if state.config.storage.abort_on_load_error => Err(e).context(
            "Failed to load the record store. \
            Fix the backing file or set storage.abort_on_load_error = false to start degraded",
        ),
        Err(e) => {
            warn!(
                error = %e,
                "Starting degraded: reads return nothing and every mutation is refused"
            );
            Ok(())
        }
    }
}

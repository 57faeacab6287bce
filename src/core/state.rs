// Application state (AppState)

use crate::broadcast::registry::BroadcastRegistry;
use crate::core::config::Config;
use crate::core::error::ApiError;
use crate::directory::key_directory::KeyDirectory;
use crate::metrics::collector::Metrics;
use crate::stores::record_store::RecordStore;
use std::sync::Arc;

/// Shared application state
///
/// Contains all shared components that are accessed by request handlers.
/// All fields are wrapped in Arc for efficient cloning across threads.
#[derive(Clone)]
pub struct AppState {
    /// Users and servers, mirrored to their backing files
    pub store: Arc<RecordStore>,

    /// Key management and heartbeat handling over the store
    pub directory: Arc<KeyDirectory>,

    /// Live stream subscribers
    pub broadcast: Arc<BroadcastRegistry>,

    pub metrics: Arc<Metrics>,

    pub config: Arc<Config>,
}

impl AppState {
    /// Build the state around an unloaded store
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);
        let store = Arc::new(RecordStore::from_config(&config.storage));

        Self {
            directory: Arc::new(KeyDirectory::new(Arc::clone(&store))),
            store,
            broadcast: Arc::new(BroadcastRegistry::new()),
            metrics: Arc::new(Metrics::new()),
            config,
        }
    }

    /// Refuse requests while the store is loading or failed
    pub fn ensure_ready(&self) -> Result<(), ApiError> {
        let status = self.store.status();
        if status.is_ready() {
            Ok(())
        } else {
            Err(ApiError::Unavailable(format!("record store is {}", status)))
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::config::{
        AdminConfig, LoggingConfig, ServerConfig, StorageConfig, StreamConfig,
    };
    use crate::models::user::User;
    use std::path::Path;
    use tempfile::TempDir;

    pub(crate) fn create_test_config(dir: &Path) -> Config {
        Config {
            server: ServerConfig {
                port: 8080,
                num_threads: 2,
            },
            storage: StorageConfig {
                users_file: dir.join("users.json"),
                servers_file: dir.join("servers.json"),
                write_timeout_ms: 5_000,
                abort_on_load_error: true,
            },
            stream: StreamConfig {
                channel_capacity: 8,
                keep_alive_secs: 15,
            },
            admin: AdminConfig {
                api_key: "test-api-key".to_string(),
            },
            logging: LoggingConfig::default(),
        }
    }

    /// Loaded state over an empty data directory
    pub(crate) async fn test_state() -> (Arc<AppState>, TempDir) {
        test_state_with_users(&[]).await
    }

    pub(crate) async fn test_state_with_users(users: &[User]) -> (Arc<AppState>, TempDir) {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("users.json"), serde_json::to_vec(users).unwrap()).unwrap();

        let state = AppState::new(create_test_config(dir.path()));
        state.store.load().await.unwrap();
        (Arc::new(state), dir)
    }

    #[tokio::test]
    async fn test_directory_shares_the_store() {
        let (state, _dir) = test_state_with_users(&[User::new(1, "alice", true, true)]).await;

        state.directory.rename_user(1, "alicia").await.unwrap();

        assert_eq!(state.store.get_user(1).await.unwrap().name, "alicia");
        assert!(Arc::ptr_eq(state.directory.store(), &state.store));
    }
}

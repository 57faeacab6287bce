use crate::core::config::StorageConfig;
use crate::core::error::{LoadError, StoreError};
use crate::models::server::{NewServer, Server, ServerPatch};
use crate::models::user::{User, UserPatch};
use crate::stores::collection::{Collection, Committed, Record};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

/// Lifecycle of the record store
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreStatus {
    Uninitialized,
    Loading,
    Ready,
    Failed(String),
}

impl StoreStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, StoreStatus::Ready)
    }

    pub fn label(&self) -> &'static str {
        match self {
            StoreStatus::Uninitialized => "uninitialized",
            StoreStatus::Loading => "loading",
            StoreStatus::Ready => "ready",
            StoreStatus::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for StoreStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreStatus::Failed(reason) => write!(f, "failed: {}", reason),
            other => f.write_str(other.label()),
        }
    }
}

/// Authoritative users and servers, mirrored to one JSON file each.
///
/// Every mutation is refused until [`RecordStore::load`] has succeeded, so a
/// backing file that failed to load is never overwritten.
pub struct RecordStore {
    users: Collection<User>,
    servers: Collection<Server>,
    status: watch::Sender<StoreStatus>,
}

impl RecordStore {
    pub fn new(users_file: PathBuf, servers_file: PathBuf, write_timeout: Duration) -> Self {
        let (status, _) = watch::channel(StoreStatus::Uninitialized);

        Self {
            users: Collection::new(users_file, write_timeout),
            servers: Collection::new(servers_file, write_timeout),
            status,
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(
            config.users_file.clone(),
            config.servers_file.clone(),
            config.write_timeout(),
        )
    }

    /// Read both backing files into memory.
    ///
    /// On failure both collections are emptied and the store stays `Failed`.
    pub async fn load(&self) -> Result<(), LoadError> {
        self.status.send_replace(StoreStatus::Loading);

        let loaded = async {
            let users = self.users.load().await?;
            let servers = self.servers.load().await?;
            Ok::<_, LoadError>((users, servers))
        }
        .await;

        match loaded {
            Ok((users, servers)) => {
                info!(
                    users,
                    servers,
                    users_file = %self.users.path().display(),
                    servers_file = %self.servers.path().display(),
                    "Record store loaded"
                );
                self.status.send_replace(StoreStatus::Ready);
                Ok(())
            }
            Err(e) => {
                self.users.clear().await;
                self.servers.clear().await;
                error!(error = %e, "Record store failed to load");
                self.status.send_replace(StoreStatus::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    pub fn status(&self) -> StoreStatus {
        self.status.borrow().clone()
    }

    /// Wait until loading has finished, successfully or not
    pub async fn ready(&self) -> Result<(), StoreError> {
        let mut receiver = self.status.subscribe();
        let settled = receiver
            .wait_for(|status| matches!(status, StoreStatus::Ready | StoreStatus::Failed(_)))
            .await
            .map(|status| (*status).clone());

        match settled {
            Ok(StoreStatus::Ready) => Ok(()),
            Ok(StoreStatus::Failed(reason)) => Err(StoreError::LoadFailed(reason)),
            _ => Err(StoreError::NotReady(self.status())),
        }
    }

    fn ensure_ready(&self) -> Result<(), StoreError> {
        match &*self.status.borrow() {
            StoreStatus::Ready => Ok(()),
            StoreStatus::Failed(reason) => Err(StoreError::LoadFailed(reason.clone())),
            other => Err(StoreError::NotReady(other.clone())),
        }
    }

    pub async fn get_user(&self, id: u32) -> Option<User> {
        self.users.get(id).await
    }

    pub async fn get_server(&self, id: u32) -> Option<Server> {
        self.servers.get(id).await
    }

    pub async fn list_users(&self) -> Vec<User> {
        self.users.snapshot().await
    }

    pub async fn list_servers(&self) -> Vec<Server> {
        self.servers.snapshot().await
    }

    pub async fn find_server_by_name(&self, name: &str) -> Option<Server> {
        self.servers.find(|server| server.name == name).await
    }

    pub async fn user_count(&self) -> usize {
        self.users.len().await
    }

    pub async fn server_count(&self) -> usize {
        self.servers.len().await
    }

    /// Merge `patch` into the user with `id`; `Ok(None)` when there is no such user
    pub async fn update_user(
        &self,
        id: u32,
        patch: UserPatch,
    ) -> Result<Option<Committed<User>>, StoreError> {
        self.modify_user(id, |user| {
            patch.apply(user);
            Ok::<_, StoreError>(())
        })
        .await
    }

    /// Run a fallible read-modify-write on one user under the users write gate
    pub async fn modify_user<F, E>(&self, id: u32, change: F) -> Result<Option<Committed<User>>, E>
    where
        F: FnOnce(&mut User) -> Result<(), E>,
        E: From<StoreError>,
    {
        self.ensure_ready()?;
        self.users
            .modify(id, |user| {
                change(user)?;
                user.validate()
                    .map_err(|reason| E::from(StoreError::InvalidRecord(reason)))
            })
            .await
    }

    pub async fn update_server(
        &self,
        id: u32,
        patch: ServerPatch,
    ) -> Result<Option<Committed<Server>>, StoreError> {
        self.modify_server(id, |server| {
            patch.apply(server);
            Ok::<_, StoreError>(())
        })
        .await
    }

    pub async fn modify_server<F, E>(
        &self,
        id: u32,
        change: F,
    ) -> Result<Option<Committed<Server>>, E>
    where
        F: FnOnce(&mut Server) -> Result<(), E>,
        E: From<StoreError>,
    {
        self.ensure_ready()?;
        self.servers
            .modify(id, |server| {
                change(server)?;
                server
                    .validate()
                    .map_err(|reason| E::from(StoreError::InvalidRecord(reason)))
            })
            .await
    }

    /// Append a server under the next unused id
    pub async fn add_server(&self, fields: NewServer) -> Result<Committed<Server>, StoreError> {
        self.ensure_ready()?;
        fields.validate().map_err(StoreError::InvalidRecord)?;
        let created = self.servers.insert_with(|id| fields.into_server(id)).await;

        info!(
            server_id = created.record.id,
            name = %created.record.name,
            durable = created.commit.is_durable(),
            "Server added"
        );
        Ok(created)
    }

    /// Write-backs that failed since startup, across both collections
    pub fn persist_failures(&self) -> u64 {
        self.users.persist_failures() + self.servers.persist_failures()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::SshKey;
    use crate::stores::collection::Commit;
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn paths(dir: &TempDir) -> (PathBuf, PathBuf) {
        (dir.path().join("users.json"), dir.path().join("servers.json"))
    }

    fn store(dir: &TempDir) -> RecordStore {
        let (users, servers) = paths(dir);
        RecordStore::new(users, servers, Duration::from_secs(5))
    }

    fn new_server(name: &str) -> NewServer {
        NewServer {
            name: name.to_string(),
            ip_address: "10.0.0.1".to_string(),
            last_heartbeat_on: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            cpu_usage_percent: 1.0,
            memory_usage_percent: 2.0,
            disk_usage_percent: 3.0,
            user_ids: vec![1],
        }
    }

    fn seed_users() -> Vec<User> {
        let mut alice = User::new(1, "alice", true, true);
        alice.ssh_keys.push(SshKey {
            comment: "alice@laptop".to_string(),
            fingerprint: "SHA256:abc".to_string(),
            public_key: "ssh-ed25519 AAAA alice@laptop".to_string(),
        });
        vec![alice, User::new(4, "bob", false, true)]
    }

    fn seed(dir: &TempDir, users: &[User], servers: &[Server]) {
        let (users_path, servers_path) = paths(dir);
        std::fs::write(users_path, serde_json::to_vec(users).unwrap()).unwrap();
        std::fs::write(servers_path, serde_json::to_vec(servers).unwrap()).unwrap();
    }

    #[tokio::test]
    async fn test_load_reproduces_backing_files() {
        let dir = TempDir::new().unwrap();
        let users = seed_users();
        let servers = vec![new_server("host-a").into_server(3)];
        seed(&dir, &users, &servers);

        let store = store(&dir);
        store.load().await.unwrap();

        assert_eq!(store.status(), StoreStatus::Ready);
        assert_eq!(store.list_users().await, users);
        assert_eq!(store.list_servers().await, servers);
        assert_eq!(store.get_user(4).await.unwrap().name, "bob");
        assert!(store.get_server(99).await.is_none());
    }

    #[tokio::test]
    async fn test_missing_files_start_empty() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.load().await.unwrap();

        assert!(store.list_users().await.is_empty());
        assert!(store.list_servers().await.is_empty());
        assert!(store.status().is_ready());
    }

    #[tokio::test]
    async fn test_update_user_changes_only_name() {
        let dir = TempDir::new().unwrap();
        seed(&dir, &seed_users(), &[]);
        let store = store(&dir);
        store.load().await.unwrap();

        let before = store.get_user(1).await.unwrap();
        let committed = store
            .update_user(1, UserPatch::name("X"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(committed.commit, Commit::Durable);
        let after = store.get_user(1).await.unwrap();
        assert_eq!(after.name, "X");
        assert_eq!(after.is_system_admin, before.is_system_admin);
        assert_eq!(after.is_active, before.is_active);
        assert_eq!(after.ssh_keys, before.ssh_keys);
    }

    #[tokio::test]
    async fn test_update_absent_user_has_no_side_effects() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.load().await.unwrap();

        let result = store.update_user(9, UserPatch::name("ghost")).await.unwrap();

        assert!(result.is_none());
        assert!(store.list_users().await.is_empty());
        assert!(!paths(&dir).0.exists());
    }

    #[tokio::test]
    async fn test_add_server_assigns_fresh_ids() {
        let dir = TempDir::new().unwrap();
        let existing = vec![
            new_server("host-a").into_server(2),
            new_server("host-b").into_server(5),
        ];
        seed(&dir, &[], &existing);
        let store = store(&dir);
        store.load().await.unwrap();

        let created = store.add_server(new_server("host-c")).await.unwrap();

        assert!(existing.iter().all(|s| s.id != created.record.id));
        assert_eq!(store.get_server(created.record.id).await, Some(created.record.clone()));
        assert_eq!(
            store.find_server_by_name("host-c").await.map(|s| s.id),
            Some(created.record.id)
        );
    }

    #[tokio::test]
    async fn test_invalid_records_are_never_committed() {
        let dir = TempDir::new().unwrap();
        seed(&dir, &[], &[new_server("host-a").into_server(1)]);
        let store = store(&dir);
        store.load().await.unwrap();

        let mut broken = new_server("host-b");
        broken.cpu_usage_percent = f64::NAN;
        assert!(matches!(
            store.add_server(broken).await,
            Err(StoreError::InvalidRecord(_))
        ));

        let patch = ServerPatch {
            disk_usage_percent: Some(f64::INFINITY),
            ..ServerPatch::default()
        };
        assert!(matches!(
            store.update_server(1, patch).await,
            Err(StoreError::InvalidRecord(_))
        ));

        assert_eq!(store.server_count().await, 1);
        assert_eq!(store.get_server(1).await.unwrap().disk_usage_percent, 3.0);

        let reloaded = self::store(&dir);
        reloaded.load().await.unwrap();
        assert_eq!(reloaded.list_servers().await, store.list_servers().await);
    }

    #[tokio::test]
    async fn test_mutations_survive_reload() {
        let dir = TempDir::new().unwrap();
        seed(&dir, &seed_users(), &[]);
        let store = store(&dir);
        store.load().await.unwrap();

        store.update_user(4, UserPatch::name("robert")).await.unwrap();
        let server = store.add_server(new_server("host-a")).await.unwrap().record;
        store
            .update_server(
                server.id,
                ServerPatch {
                    disk_usage_percent: Some(88.0),
                    ..ServerPatch::default()
                },
            )
            .await
            .unwrap();

        let fresh = self::store(&dir);
        fresh.load().await.unwrap();
        assert_eq!(fresh.get_user(4).await.unwrap().name, "robert");
        assert_eq!(fresh.get_server(server.id).await.unwrap().disk_usage_percent, 88.0);
        assert_eq!(fresh.list_users().await, store.list_users().await);
    }

    #[tokio::test]
    async fn test_invalid_file_fails_the_store() {
        let dir = TempDir::new().unwrap();
        let (users_path, _) = paths(&dir);
        std::fs::write(
            &users_path,
            r#"[{"id":1,"isSystemAdmin":false,"isActive":true,"name":"a","sshKeys":[],"extra":1}]"#,
        )
        .unwrap();

        let store = store(&dir);
        assert!(store.load().await.is_err());

        assert!(matches!(store.status(), StoreStatus::Failed(_)));
        assert!(store.list_users().await.is_empty());
        assert!(matches!(
            store.update_user(1, UserPatch::name("b")).await,
            Err(StoreError::LoadFailed(_))
        ));
        assert!(matches!(
            store.add_server(new_server("host-a")).await,
            Err(StoreError::LoadFailed(_))
        ));
        // The corrupt file is left as it was
        assert!(std::fs::read_to_string(&users_path).unwrap().contains("extra"));
    }

    #[tokio::test]
    async fn test_mutations_refused_before_load() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        assert_eq!(
            store.add_server(new_server("host-a")).await,
            Err(StoreError::NotReady(StoreStatus::Uninitialized))
        );
    }

    #[tokio::test]
    async fn test_failed_write_back_is_memory_only() {
        let dir = TempDir::new().unwrap();
        let servers_path = dir.path().join("servers.json");
        let store = RecordStore::new(
            dir.path().join("users.json"),
            servers_path.clone(),
            Duration::from_secs(5),
        );
        store.load().await.unwrap();

        // A non-empty directory in place of the servers file makes the rename fail
        std::fs::create_dir(&servers_path).unwrap();
        std::fs::write(servers_path.join("blocker"), b"x").unwrap();

        let created = store.add_server(new_server("host-a")).await.unwrap();

        assert!(matches!(created.commit, Commit::MemoryOnly { .. }));
        assert_eq!(store.get_server(created.record.id).await, Some(created.record));
        assert_eq!(store.persist_failures(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_updates_are_serialized() {
        let dir = TempDir::new().unwrap();
        seed(&dir, &[], &[new_server("host-a").into_server(1)]);
        let store = Arc::new(store(&dir));
        store.load().await.unwrap();

        let mut handles = Vec::new();
        for i in 0..16u32 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .modify_server(1, |server| {
                        server.user_ids.push(100 + i);
                        Ok::<_, StoreError>(())
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let in_memory = store.get_server(1).await.unwrap();
        assert_eq!(in_memory.user_ids.len(), 17);

        let fresh = self::store(&dir);
        fresh.load().await.unwrap();
        assert_eq!(fresh.get_server(1).await.unwrap(), in_memory);
    }

    #[tokio::test]
    async fn test_ready_waits_for_load() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(store(&dir));

        let waiter = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.ready().await })
        };
        tokio::task::yield_now().await;
        store.load().await.unwrap();

        assert_eq!(waiter.await.unwrap(), Ok(()));
    }

    #[tokio::test]
    async fn test_ready_reports_load_failure() {
        let dir = TempDir::new().unwrap();
        std::fs::write(paths(&dir).1, "not json").unwrap();
        let store = store(&dir);
        let _ = store.load().await;

        assert!(matches!(store.ready().await, Err(StoreError::LoadFailed(_))));
    }

    #[test]
    fn test_status_display() {
        assert_eq!(StoreStatus::Ready.to_string(), "ready");
        assert_eq!(StoreStatus::Failed("bad".into()).to_string(), "failed: bad");
        assert_eq!(StoreStatus::Failed("bad".into()).label(), "failed");
    }
}

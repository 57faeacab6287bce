use crate::core::error::DirectoryError;
use crate::directory::ssh;
use crate::models::server::{non_finite_gauge, NewServer, Server, ServerPatch};
use crate::models::user::{User, UserPatch};
use crate::stores::collection::{Commit, Committed};
use crate::stores::record_store::RecordStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Identity and gauges reported by a fleet server
#[derive(Clone, Debug, PartialEq)]
pub struct HeartbeatReport {
    pub hostname: String,
    pub ip_address: String,
    pub cpu_usage_percent: f64,
    pub memory_usage_percent: f64,
    pub disk_usage_percent: f64,
    pub at: DateTime<Utc>,
}

/// Keys a server should trust for one user
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyEntry {
    pub name: String,
    pub public_keys: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct HeartbeatOutcome {
    pub server: Server,
    /// True when this heartbeat registered the server
    pub created: bool,
    pub keys: Vec<KeyEntry>,
    pub commit: Commit,
}

/// Profile fields an operator may change on a user
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub is_active: Option<bool>,
    pub is_system_admin: Option<bool>,
}

/// Key management and heartbeat handling on top of the record store
pub struct KeyDirectory {
    store: Arc<RecordStore>,
    // Serializes lookup-by-name and creation so a hostname maps to one server
    heartbeat_gate: Mutex<()>,
}

impl KeyDirectory {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self {
            store,
            heartbeat_gate: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    pub async fn rename_user(&self, id: u32, name: &str) -> Result<Committed<User>, DirectoryError> {
        self.update_profile(
            id,
            ProfileUpdate {
                name: Some(name.to_string()),
                ..ProfileUpdate::default()
            },
        )
        .await
    }

    pub async fn set_user_active(
        &self,
        id: u32,
        active: bool,
    ) -> Result<Committed<User>, DirectoryError> {
        self.update_profile(
            id,
            ProfileUpdate {
                is_active: Some(active),
                ..ProfileUpdate::default()
            },
        )
        .await
    }

    pub async fn set_system_admin(
        &self,
        id: u32,
        system_admin: bool,
    ) -> Result<Committed<User>, DirectoryError> {
        self.update_profile(
            id,
            ProfileUpdate {
                is_system_admin: Some(system_admin),
                ..ProfileUpdate::default()
            },
        )
        .await
    }

    /// Apply several profile fields as one mutation
    pub async fn update_profile(
        &self,
        id: u32,
        update: ProfileUpdate,
    ) -> Result<Committed<User>, DirectoryError> {
        let name = match update.name {
            Some(name) => {
                let name = name.trim();
                if name.is_empty() {
                    return Err(DirectoryError::EmptyName);
                }
                Some(name.to_string())
            }
            None => None,
        };

        let patch = UserPatch {
            name,
            is_active: update.is_active,
            is_system_admin: update.is_system_admin,
            ssh_keys: None,
        };
        if patch.is_empty() {
            return Err(DirectoryError::NothingToUpdate);
        }

        let committed = self
            .store
            .update_user(id, patch)
            .await?
            .ok_or(DirectoryError::UserNotFound(id))?;

        info!(
            user_id = id,
            name = %committed.record.name,
            is_active = committed.record.is_active,
            is_system_admin = committed.record.is_system_admin,
            durable = committed.commit.is_durable(),
            "User profile updated"
        );
        Ok(committed)
    }

    /// Parse `public_key` and append it to the user's keys
    pub async fn add_ssh_key(
        &self,
        user_id: u32,
        public_key: &str,
    ) -> Result<Committed<User>, DirectoryError> {
        let key = ssh::to_ssh_key(public_key)?;
        let fingerprint = key.fingerprint.clone();

        let committed = self
            .store
            .modify_user(user_id, |user| {
                if user.has_fingerprint(&key.fingerprint) {
                    return Err(DirectoryError::DuplicateKey(key.fingerprint.clone()));
                }
                user.ssh_keys.push(key);
                Ok(())
            })
            .await?
            .ok_or(DirectoryError::UserNotFound(user_id))?;

        info!(user_id, fingerprint = %fingerprint, "SSH key added");
        Ok(committed)
    }

    pub async fn remove_ssh_key(
        &self,
        user_id: u32,
        fingerprint: &str,
    ) -> Result<Committed<User>, DirectoryError> {
        let committed = self
            .store
            .modify_user(user_id, |user| {
                let position = user
                    .ssh_keys
                    .iter()
                    .position(|key| key.fingerprint == fingerprint)
                    .ok_or_else(|| DirectoryError::KeyNotFound(fingerprint.to_string()))?;
                user.ssh_keys.remove(position);
                Ok::<_, DirectoryError>(())
            })
            .await?
            .ok_or(DirectoryError::UserNotFound(user_id))?;

        info!(user_id, fingerprint, "SSH key removed");
        Ok(committed)
    }

    /// Authorize `user_ids` on a server, skipping ids that are already members
    pub async fn assign_users(
        &self,
        server_id: u32,
        user_ids: &[u32],
    ) -> Result<Committed<Server>, DirectoryError> {
        let known = self.store.list_users().await;
        let mut unknown: Vec<u32> = user_ids
            .iter()
            .copied()
            .filter(|id| !known.iter().any(|user| user.id == *id))
            .collect();
        if !unknown.is_empty() {
            unknown.sort_unstable();
            unknown.dedup();
            return Err(DirectoryError::UnknownUsers(unknown));
        }

        let committed = self
            .store
            .modify_server(server_id, |server| {
                for id in user_ids {
                    if !server.has_user(*id) {
                        server.user_ids.push(*id);
                    }
                }
                Ok::<_, DirectoryError>(())
            })
            .await?
            .ok_or(DirectoryError::ServerNotFound(server_id))?;

        info!(
            server_id,
            user_ids = ?committed.record.user_ids,
            "Users assigned to server"
        );
        Ok(committed)
    }

    pub async fn remove_user_from_server(
        &self,
        server_id: u32,
        user_id: u32,
    ) -> Result<Committed<Server>, DirectoryError> {
        let committed = self
            .store
            .modify_server(server_id, |server| {
                let before = server.user_ids.len();
                server.user_ids.retain(|id| *id != user_id);
                if server.user_ids.len() == before {
                    return Err(DirectoryError::NotAMember { server_id, user_id });
                }
                Ok(())
            })
            .await?
            .ok_or(DirectoryError::ServerNotFound(server_id))?;

        info!(server_id, user_id, "User removed from server");
        Ok(committed)
    }

    /// Register or refresh the reporting server and resolve the keys it should trust.
    ///
    /// A new server starts out trusting every active system admin.
    pub async fn heartbeat(
        &self,
        report: HeartbeatReport,
    ) -> Result<HeartbeatOutcome, DirectoryError> {
        let hostname = report.hostname.trim();
        if hostname.is_empty() {
            return Err(DirectoryError::EmptyHostname);
        }
        if let Some(field) = non_finite_gauge(
            report.cpu_usage_percent,
            report.memory_usage_percent,
            report.disk_usage_percent,
        ) {
            return Err(DirectoryError::InvalidGauge { field });
        }

        let (committed, created) = {
            let _gate = self.heartbeat_gate.lock().await;

            match self.store.find_server_by_name(hostname).await {
                Some(existing) => {
                    let patch = ServerPatch {
                        ip_address: Some(report.ip_address),
                        last_heartbeat_on: Some(report.at),
                        cpu_usage_percent: Some(report.cpu_usage_percent),
                        memory_usage_percent: Some(report.memory_usage_percent),
                        disk_usage_percent: Some(report.disk_usage_percent),
                        ..ServerPatch::default()
                    };
                    let committed = self
                        .store
                        .update_server(existing.id, patch)
                        .await?
                        .ok_or(DirectoryError::ServerNotFound(existing.id))?;
                    (committed, false)
                }
                None => {
                    let admins: Vec<u32> = self
                        .store
                        .list_users()
                        .await
                        .into_iter()
                        .filter(|user| user.is_system_admin && user.is_active)
                        .map(|user| user.id)
                        .collect();

                    let committed = self
                        .store
                        .add_server(NewServer {
                            name: hostname.to_string(),
                            ip_address: report.ip_address,
                            last_heartbeat_on: report.at,
                            cpu_usage_percent: report.cpu_usage_percent,
                            memory_usage_percent: report.memory_usage_percent,
                            disk_usage_percent: report.disk_usage_percent,
                            user_ids: admins,
                        })
                        .await?;
                    (committed, true)
                }
            }
        };

        let keys = self.resolve_keys(&committed.record).await;

        debug!(
            server_id = committed.record.id,
            hostname = %committed.record.name,
            created,
            key_entries = keys.len(),
            "Heartbeat processed"
        );

        Ok(HeartbeatOutcome {
            server: committed.record,
            created,
            keys,
            commit: committed.commit,
        })
    }

    /// One entry per active member that has at least one key, in membership order
    pub async fn resolve_keys(&self, server: &Server) -> Vec<KeyEntry> {
        let mut entries = Vec::with_capacity(server.user_ids.len());

        for id in &server.user_ids {
            let Some(user) = self.store.get_user(*id).await else {
                debug!(server_id = server.id, user_id = id, "Skipping unknown user id");
                continue;
            };
            if !user.is_active || user.ssh_keys.is_empty() {
                continue;
            }
            entries.push(KeyEntry {
                public_keys: user.public_keys(),
                name: user.name,
            });
        }

        entries
    }
}

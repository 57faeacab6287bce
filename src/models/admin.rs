use crate::directory::key_directory::KeyEntry;
use crate::models::server::Server;
use crate::stores::collection::Committed;
use serde::{Deserialize, Serialize};

/// Query string of the heartbeat endpoint
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerKeysQuery {
    pub hostname: Option<String>,
    pub cpu_usage_percent: Option<f64>,
    pub memory_usage_percent: Option<f64>,
    pub disk_usage_percent: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServerKeysResponse {
    pub data: Vec<KeyEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub is_active: Option<bool>,
    pub is_system_admin: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AddSshKeyRequest {
    pub public_key: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoveSshKeyRequest {
    pub fingerprint: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AssignUsersRequest {
    pub user_ids: Vec<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RemoveServerUserRequest {
    pub user_id: u32,
}

/// A server as shown to operators, with a relative "last seen" label
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerView {
    #[serde(flatten)]
    pub server: Server,
    pub last_seen: String,
}

/// Result of an admin mutation; `durable` is false when the change only reached memory
#[derive(Debug, Serialize, Deserialize)]
pub struct MutationResponse<T> {
    pub success: bool,
    pub durable: bool,
    pub data: T,
}

impl<T> From<Committed<T>> for MutationResponse<T> {
    fn from(committed: Committed<T>) -> Self {
        Self {
            success: true,
            durable: committed.commit.is_durable(),
            data: committed.record,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DataResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> DataResponse<T> {
    pub fn new(data: T) -> Self {
        Self { success: true, data }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

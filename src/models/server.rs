use crate::stores::collection::Record;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A fleet server that reports heartbeats and pulls authorized keys
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Server {
    /// Server ID
    pub id: u32,
    /// Hostname reported by the server; the heartbeat lookup key
    pub name: String,
    pub ip_address: String,
    pub last_heartbeat_on: DateTime<Utc>,
    pub cpu_usage_percent: f64,
    pub memory_usage_percent: f64,
    pub disk_usage_percent: f64,
    /// Users whose keys this server trusts, in assignment order
    pub user_ids: Vec<u32>,
}

impl Server {
    pub fn has_user(&self, user_id: u32) -> bool {
        self.user_ids.contains(&user_id)
    }
}

impl Record for Server {
    const KIND: &'static str = "server";

    fn id(&self) -> u32 {
        self.id
    }

    fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err(format!("server {} has an empty name", self.id));
        }
        match non_finite_gauge(
            self.cpu_usage_percent,
            self.memory_usage_percent,
            self.disk_usage_percent,
        ) {
            Some(field) => Err(format!("server {} has a non-finite {}", self.id, field)),
            None => Ok(()),
        }
    }
}

/// Name of the first gauge that JSON cannot carry (NaN or infinite)
pub fn non_finite_gauge(cpu: f64, memory: f64, disk: f64) -> Option<&'static str> {
    [
        ("cpuUsagePercent", cpu),
        ("memoryUsagePercent", memory),
        ("diskUsagePercent", disk),
    ]
    .into_iter()
    .find(|(_, value)| !value.is_finite())
    .map(|(field, _)| field)
}

/// Fields for a server that has not been assigned an id yet
#[derive(Clone, Debug, PartialEq)]
pub struct NewServer {
    pub name: String,
    pub ip_address: String,
    pub last_heartbeat_on: DateTime<Utc>,
    pub cpu_usage_percent: f64,
    pub memory_usage_percent: f64,
    pub disk_usage_percent: f64,
    pub user_ids: Vec<u32>,
}

impl NewServer {
    /// The checks a stored [`Server`] must pass, before an id is spent on it
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("server name is empty".to_string());
        }
        match non_finite_gauge(
            self.cpu_usage_percent,
            self.memory_usage_percent,
            self.disk_usage_percent,
        ) {
            Some(field) => Err(format!("server {} has a non-finite {}", self.name, field)),
            None => Ok(()),
        }
    }

    pub fn into_server(self, id: u32) -> Server {
        Server {
            id,
            name: self.name,
            ip_address: self.ip_address,
            last_heartbeat_on: self.last_heartbeat_on,
            cpu_usage_percent: self.cpu_usage_percent,
            memory_usage_percent: self.memory_usage_percent,
            disk_usage_percent: self.disk_usage_percent,
            user_ids: self.user_ids,
        }
    }
}

/// Partial update for a server; absent fields are left untouched.
///
/// The name is the heartbeat lookup key and cannot be patched.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ServerPatch {
    pub ip_address: Option<String>,
    pub last_heartbeat_on: Option<DateTime<Utc>>,
    pub cpu_usage_percent: Option<f64>,
    pub memory_usage_percent: Option<f64>,
    pub disk_usage_percent: Option<f64>,
    pub user_ids: Option<Vec<u32>>,
}

impl ServerPatch {
    pub fn apply(self, server: &mut Server) {
        if let Some(ip_address) = self.ip_address {
            server.ip_address = ip_address;
        }
        if let Some(last_heartbeat_on) = self.last_heartbeat_on {
            server.last_heartbeat_on = last_heartbeat_on;
        }
        if let Some(cpu) = self.cpu_usage_percent {
            server.cpu_usage_percent = cpu;
        }
        if let Some(memory) = self.memory_usage_percent {
            server.memory_usage_percent = memory;
        }
        if let Some(disk) = self.disk_usage_percent {
            server.disk_usage_percent = disk;
        }
        if let Some(user_ids) = self.user_ids {
            server.user_ids = user_ids;
        }
    }
}

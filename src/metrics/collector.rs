use crate::broadcast::registry::BroadcastRegistry;
use crate::stores::record_store::RecordStore;
use crate::utils::time::current_timestamp;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

pub struct Metrics {
    pub heartbeats: AtomicU64,
    pub servers_registered: AtomicU64,
    pub broadcasts: AtomicU64,
    pub delivery_failures: AtomicU64,
    pub start_time: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub heartbeats: u64,
    pub servers_registered: u64,
    pub broadcasts: u64,
    pub delivery_failures: u64,
    pub persistence_failures: u64,
    pub users: usize,
    pub servers: usize,
    pub subscribers: usize,
    pub store_status: String,
    pub uptime_seconds: i64,
    pub heartbeats_per_second: f64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            heartbeats: AtomicU64::new(0),
            servers_registered: AtomicU64::new(0),
            broadcasts: AtomicU64::new(0),
            delivery_failures: AtomicU64::new(0),
            start_time: current_timestamp(),
        }
    }

    pub fn increment_heartbeats(&self) {
        self.heartbeats.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_servers_registered(&self) {
        self.servers_registered.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one broadcast and the deliveries that failed in it
    pub fn record_broadcast(&self, failed_deliveries: usize) {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
        self.delivery_failures
            .fetch_add(failed_deliveries as u64, Ordering::Relaxed);
    }

    /// Combine the counters with live figures from the store and the registry
    pub async fn get_snapshot(
        &self,
        store: &RecordStore,
        registry: &BroadcastRegistry,
    ) -> MetricsSnapshot {
        let heartbeats = self.heartbeats.load(Ordering::Relaxed);
        let uptime_seconds = current_timestamp() - self.start_time;

        let heartbeats_per_second = if uptime_seconds > 0 {
            heartbeats as f64 / uptime_seconds as f64
        } else {
            0.0
        };

        MetricsSnapshot {
            heartbeats,
            servers_registered: self.servers_registered.load(Ordering::Relaxed),
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
            persistence_failures: store.persist_failures(),
            users: store.user_count().await,
            servers: store.server_count().await,
            subscribers: registry.len(),
            store_status: store.status().label().to_string(),
            uptime_seconds,
            heartbeats_per_second,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

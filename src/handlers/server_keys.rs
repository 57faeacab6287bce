use crate::core::error::ApiError;
use crate::core::state::AppState;
use crate::directory::key_directory::HeartbeatReport;
use crate::models::admin::{ServerKeysQuery, ServerKeysResponse};
use axum::{
    extract::{rejection::QueryRejection, ConnectInfo, Query, State},
    http::HeaderMap,
    Json,
};
use chrono::Utc;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, instrument, warn};

pub const HEARTBEAT_EVENT: &str = "heartbeat";

/// Heartbeat and key fetch for fleet servers
///
/// GET /api/v1/server/keys?hostname=<name>&cpuUsagePercent=<n>&memoryUsagePercent=<n>&diskUsagePercent=<n>
///
/// # Flow
/// 1. Validate the query (hostname is required, gauges default to 0 and must be finite)
/// 2. Register or refresh the server record
/// 3. Broadcast the server to live stream subscribers
/// 4. Return the keys of every active member
#[instrument(skip(state, query, headers))]
pub async fn server_keys_handler(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ServerKeysQuery>, QueryRejection>,
    headers: HeaderMap,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Result<Json<ServerKeysResponse>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::InvalidParameter(e.body_text()))?;

    let hostname = query
        .hostname
        .as_deref()
        .map(str::trim)
        .filter(|hostname| !hostname.is_empty())
        .ok_or_else(|| {
            warn!("Heartbeat without hostname");
            ApiError::InvalidParameter("hostname query parameter is required".to_string())
        })?;

    let report = HeartbeatReport {
        hostname: hostname.to_string(),
        ip_address: client_ip(&headers, addr),
        cpu_usage_percent: query.cpu_usage_percent.unwrap_or(0.0),
        memory_usage_percent: query.memory_usage_percent.unwrap_or(0.0),
        disk_usage_percent: query.disk_usage_percent.unwrap_or(0.0),
        at: Utc::now(),
    };

    let outcome = state.directory.heartbeat(report).await?;
    state.metrics.increment_heartbeats();

    if outcome.created {
        state.metrics.increment_servers_registered();
        info!(
            server_id = outcome.server.id,
            hostname = %outcome.server.name,
            ip = %outcome.server.ip_address,
            authorized_users = outcome.server.user_ids.len(),
            durable = outcome.commit.is_durable(),
            "New server registered"
        );
    } else if !outcome.commit.is_durable() {
        warn!(
            server_id = outcome.server.id,
            hostname = %outcome.server.name,
            durable = false,
            "Heartbeat recorded in memory only"
        );
    }

    match serde_json::to_string(&outcome.server) {
        Ok(payload) => {
            let report = state.broadcast.broadcast(HEARTBEAT_EVENT, &payload);
            state.metrics.record_broadcast(report.failed.len());
        }
        Err(e) => warn!(error = %e, "Failed to serialize heartbeat event"),
    }

    Ok(Json(ServerKeysResponse { data: outcome.keys }))
}

/// First hop of `x-forwarded-for` when present, otherwise the peer address
fn client_ip(headers: &HeaderMap, addr: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| addr.ip().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::channel::ChannelSubscriber;
    use crate::core::state::tests::test_state_with_users;
    use crate::directory::ssh;
    use crate::models::user::User;
    use crate::stores::record_store::RecordStore;
    use axum::http::{HeaderValue, StatusCode, Uri};
    use std::sync::atomic::Ordering;
    use axum::response::IntoResponse;

    const KEY: &str = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIAABAgMEBQYHCAkKCwwNDg8QERITFBUWFxgZGhscHR4f alice@laptop";

    fn query(hostname: Option<&str>) -> Result<Query<ServerKeysQuery>, QueryRejection> {
        Ok(Query(ServerKeysQuery {
            hostname: hostname.map(str::to_string),
            cpu_usage_percent: Some(12.5),
            memory_usage_percent: None,
            disk_usage_percent: Some(70.0),
        }))
    }

    fn peer() -> ConnectInfo<SocketAddr> {
        ConnectInfo("192.168.1.20:40000".parse().unwrap())
    }

    fn users() -> Vec<User> {
        let mut alice = User::new(1, "alice", true, true);
        alice.ssh_keys.push(ssh::to_ssh_key(KEY).unwrap());
        vec![alice, User::new(2, "bob", true, true)]
    }

    #[tokio::test]
    async fn test_heartbeat_returns_admin_keys() {
        let (state, _dir) = test_state_with_users(&users()).await;

        let Json(response) = server_keys_handler(
            State(Arc::clone(&state)),
            query(Some("host-a")),
            HeaderMap::new(),
            peer(),
        )
        .await
        .unwrap();

        assert_eq!(response.data.len(), 1);
        assert_eq!(response.data[0].name, "alice");
        assert_eq!(response.data[0].public_keys, vec![KEY.to_string()]);

        let server = state.store.find_server_by_name("host-a").await.unwrap();
        assert_eq!(server.ip_address, "192.168.1.20");
        assert_eq!(server.cpu_usage_percent, 12.5);
        assert_eq!(server.memory_usage_percent, 0.0);
        assert_eq!(server.user_ids, vec![1, 2]);
        assert_eq!(state.metrics.servers_registered.load(std::sync::atomic::Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_heartbeat_is_broadcast() {
        let (state, _dir) = test_state_with_users(&users()).await;
        let (subscriber, mut receiver) = ChannelSubscriber::channel(4);
        state.broadcast.register("dashboard", Arc::new(subscriber));

        server_keys_handler(
            State(Arc::clone(&state)),
            query(Some("host-a")),
            HeaderMap::new(),
            peer(),
        )
        .await
        .unwrap();

        let event = receiver.try_recv().unwrap();
        assert_eq!(event.event, HEARTBEAT_EVENT);
        let payload: serde_json::Value = serde_json::from_str(&event.data).unwrap();
        assert_eq!(payload["name"], "host-a");
        assert_eq!(payload["id"], 1);
    }

    #[tokio::test]
    async fn test_missing_hostname_is_bad_request() {
        let (state, _dir) = test_state_with_users(&users()).await;

        for hostname in [None, Some("   ")] {
            let result = server_keys_handler(
                State(Arc::clone(&state)),
                query(hostname),
                HeaderMap::new(),
                peer(),
            )
            .await;

            let response = result.unwrap_err().into_response();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }
        assert!(state.store.list_servers().await.is_empty());
    }

    #[tokio::test]
    async fn test_non_finite_gauges_are_bad_request() {
        let (state, _dir) = test_state_with_users(&users()).await;

        let heartbeat = |uri: &'static str| {
            let state = Arc::clone(&state);
            async move {
                let uri: Uri = uri.parse().unwrap();
                server_keys_handler(
                    State(state),
                    Query::try_from_uri(&uri),
                    HeaderMap::new(),
                    peer(),
                )
                .await
            }
        };

        let status = heartbeat("/api/v1/server/keys?hostname=host-a&cpuUsagePercent=NaN")
            .await
            .unwrap_err()
            .into_response()
            .status();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(state.store.list_servers().await.is_empty());

        heartbeat("/api/v1/server/keys?hostname=host-a&cpuUsagePercent=5")
            .await
            .unwrap();

        for uri in [
            "/api/v1/server/keys?hostname=host-a&diskUsagePercent=inf",
            "/api/v1/server/keys?hostname=host-a&memoryUsagePercent=-inf",
        ] {
            let status = heartbeat(uri).await.unwrap_err().into_response().status();
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }
        assert_eq!(state.metrics.heartbeats.load(Ordering::Relaxed), 1);

        let reloaded = RecordStore::from_config(&state.config.storage);
        reloaded.load().await.unwrap();
        assert_eq!(reloaded.list_servers().await, state.store.list_servers().await);
        assert_eq!(reloaded.list_servers().await[0].cpu_usage_percent, 5.0);
    }

    #[tokio::test]
    async fn test_refused_heartbeats_are_not_counted() {
        let (state, _dir) = test_state_with_users(&users()).await;

        server_keys_handler(
            State(Arc::clone(&state)),
            query(Some("host-a")),
            HeaderMap::new(),
            peer(),
        )
        .await
        .unwrap();
        assert_eq!(state.metrics.heartbeats.load(Ordering::Relaxed), 1);

        std::fs::write(&state.config.storage.servers_file, "{").unwrap();
        assert!(state.store.load().await.is_err());

        let result = server_keys_handler(
            State(Arc::clone(&state)),
            query(Some("host-a")),
            HeaderMap::new(),
            peer(),
        )
        .await;

        let response = result.unwrap_err().into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(state.metrics.heartbeats.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_client_ip_prefers_forwarded_header() {
        let addr: SocketAddr = "10.0.0.1:5000".parse().unwrap();
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers, addr), "10.0.0.1");

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.9, 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers, addr), "203.0.113.9");
    }
}

//! `/health` endpoint: relay liveness plus whether chat can still be stored.

use std::time::Instant;

use relay_store::MessageStore;
use serde::Serialize;
use tracing::warn;

use crate::hub::Hub;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `"ok"`, or `"degraded"` when the message store cannot be read.
    pub status: &'static str,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Open WebSocket connections.
    pub connections: usize,
    /// Distinct display names currently announced.
    pub members: usize,
    /// `"ok"` or `"unavailable"`.
    pub store: &'static str,
}

impl HealthResponse {
    pub fn is_healthy(&self) -> bool {
        self.status == "ok"
    }
}

/// Ask the hub for its counts and read one row from the store.
pub async fn health_check(start_time: Instant, hub: &Hub, store: &dyn MessageStore) -> HealthResponse {
    let connections = hub.connection_count().await;
    let members = hub.presence().await.users.len();
    let store_ok = match store.recent(1).await {
        Ok(_) => true,
        Err(e) => {
            warn!(error = %e, "message store unreachable");
            false
        }
    };
    HealthResponse {
        status: if store_ok { "ok" } else { "degraded" },
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        members,
        store: if store_ok { "ok" } else { "unavailable" },
    }
}

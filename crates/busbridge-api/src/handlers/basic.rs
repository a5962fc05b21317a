//! Health check.

use axum::{extract::State, Json};
use busbridge_core::DispatcherStats;
use serde::Serialize;

use super::ServerState;

#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub service: String,
    pub version: &'static str,
    pub uptime: u64,
    pub transport: String,
    pub connected: bool,
    pub objects: usize,
    pub dispatcher: DispatcherStats,
}

/// `GET /api/health`. Reports `degraded` while the transport is down.
pub async fn health_handler(State(state): State<ServerState>) -> Json<HealthStatus> {
    let uptime = chrono::Utc::now().timestamp() - state.started_at;
    let link = state.bridge.link();
    let connected = link.is_connected();

    Json(HealthStatus {
        status: if connected { "healthy" } else { "degraded" }.to_string(),
        service: "busbridge".to_string(),
        version: env!("CARGO_PKG_VERSION"),
        uptime: uptime.max(0) as u64,
        transport: link.transport_name().to_string(),
        connected,
        objects: state.bridge.registry().len(),
        dispatcher: link.dispatcher().stats(),
    })
}

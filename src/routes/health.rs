//! Health check endpoints
//!
//! - /health, /healthz - liveness plus a store ping; 503 when the store is down
//! - /version          - build information

use hyper::StatusCode;
use serde::Serialize;
use serde_json::json;

use super::response::{json_response, ApiResponse};
use crate::server::AppState;
use crate::types::Result;

#[derive(Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: &'static str,
    /// Uptime in seconds
    pub uptime: u64,
    pub timestamp: String,
    pub mode: &'static str,
    pub store: StoreHealth,
}

#[derive(Serialize)]
pub struct StoreHealth {
    pub backend: &'static str,
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize)]
pub struct VersionInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub commit: &'static str,
    pub built_at: &'static str,
}

pub async fn health_check(state: &AppState) -> Result<ApiResponse> {
    let store = state.collections.store.as_ref();
    let ping = store.ping().await;
    let healthy = ping.is_ok();

    let health = HealthResponse {
        healthy,
        version: env!("CARGO_PKG_VERSION"),
        uptime: state.started_at.elapsed().as_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        mode: if state.args.dev_mode { "development" } else { "production" },
        store: StoreHealth {
            backend: store.backend(),
            connected: healthy,
            error: ping.err().map(|e| e.public_message()),
        },
    };

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    Ok(json_response(
        status,
        &json!({
            "success": healthy,
            "message": if healthy { "OK" } else { "Η υπηρεσία δεν είναι διαθέσιμη." },
            "data": health,
        }),
    ))
}

pub fn version_info() -> Result<ApiResponse> {
    super::response::ok(
        "OK",
        VersionInfo {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            commit: env!("GIT_COMMIT_SHORT"),
            built_at: env!("BUILD_TIMESTAMP"),
        },
    )
}

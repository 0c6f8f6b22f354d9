//! Service info and health endpoints.

use crate::error::ApiResult;
use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInfo {
    pub service: &'static str,
    pub version: &'static str,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub storage_backend: &'static str,
    pub uptime_secs: u64,
    pub timestamp: String,
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| String::new())
}

/// GET / - service identification.
pub async fn service_info() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        service: "depot",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: now_rfc3339(),
    })
}

/// GET /health - liveness plus catalog connectivity.
///
/// Intentionally unauthenticated for load balancer and k8s probes.
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    state.catalog.health_check().await?;

    Ok(Json(HealthResponse {
        status: "ok",
        storage_backend: state.storage.backend_name(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        timestamp: now_rfc3339(),
    }))
}

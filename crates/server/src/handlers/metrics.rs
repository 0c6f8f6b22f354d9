//! JSON metrics endpoint.

use crate::error::ApiResult;
use crate::metrics_store::MetricsSnapshot;
use crate::state::AppState;
use axum::extract::State;
use axum::Json;

/// Entries returned in the topDownloads leaderboard.
const TOP_DOWNLOADS_LIMIT: i64 = 10;

/// GET /metrics - aggregate mirror metrics from the catalog.
pub async fn get_metrics(State(state): State<AppState>) -> ApiResult<Json<MetricsSnapshot>> {
    let snapshot = state.metrics.snapshot(TOP_DOWNLOADS_LIMIT).await?;
    Ok(Json(snapshot))
}

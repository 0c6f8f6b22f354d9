//! Download endpoint.

use crate::error::{ApiError, ApiResult};
use crate::metrics::DOWNLOAD_DURATION;
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use tracing::instrument;

/// GET /download/{mod_id}/{file_id}
///
/// Streams the file to the client, from blob storage on a hit or straight
/// from the origin on a miss. The response starts as soon as bytes are
/// available; a miss does not wait for the storage upload.
#[instrument(skip(state))]
pub async fn download_file(
    State(state): State<AppState>,
    Path((mod_id, file_id)): Path<(String, String)>,
) -> ApiResult<Response> {
    let timer = DOWNLOAD_DURATION.start_timer();
    let download = state.mirror.mirror_file(&mod_id, &file_id).await?;
    timer.observe_duration();

    let disposition = format!("attachment; filename=\"{}\"", download.filename);
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, download.size)
        .header(header::CONTENT_DISPOSITION, disposition)
        .body(Body::from_stream(download.stream))
        .map_err(|e| ApiError::Internal(format!("failed to build response: {e}")))
}

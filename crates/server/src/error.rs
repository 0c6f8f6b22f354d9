//! API error types.
//!
//! Error bodies on the download path are part of the public contract:
//! 404 responses carry `{"error": "Not found"}` and 500 responses carry
//! `{"error": "Internal server error"}`, with no further detail. Everything
//! else goes to the logs.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("storage error: {0}")]
    Storage(#[from] depot_storage::StorageError),

    #[error("catalog error: {0}")]
    Catalog(#[from] depot_catalog::CatalogError),

    #[error("mirror error: {0}")]
    Mirror(#[from] crate::mirror::MirrorError),
}

impl ApiError {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Storage(depot_storage::StorageError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Catalog(depot_catalog::CatalogError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Mirror(crate::mirror::MirrorError::NotFound(_)) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
        }

        let body = match status {
            StatusCode::NOT_FOUND => json!({"error": "Not found"}),
            _ => json!({"error": "Internal server error"}),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

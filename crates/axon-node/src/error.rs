//! API error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use axon_store::StoreError;

/// Errors surfaced by the HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed or unacceptable input on a user-facing endpoint.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// A create endpoint hit an existing record id.
    #[error("record already exists")]
    Duplicate,

    #[error("not found")]
    NotFound,

    /// A sync receive batch failed validation; the batch stops and the
    /// caller retries idempotently.
    #[error("sync ingest failed: {0}")]
    Ingest(StoreError),

    #[error("store error: {0}")]
    Store(StoreError),

    #[error("sync error: {0}")]
    Sync(#[from] axon_sync::SyncError),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Duplicate => StatusCode::CONFLICT,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Ingest(_) | ApiError::Store(_) | ApiError::Sync(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

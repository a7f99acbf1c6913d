//! Processing status routes
//!
//! - `GET /api/v1/processing_status/:job_id` - Progress of an ingestion job

use crate::api::response::{ApiResponse, ErrorResponse};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::sync::Arc;

use super::queries::{GetProcessingStatusError, GetProcessingStatusQuery};
use crate::ingest::framework::ProgressStore;

pub fn processing_status_routes() -> Router<Arc<dyn ProgressStore>> {
    Router::new().route("/:job_id", get(get_processing_status))
}

/// Get job progress
///
/// # Response
///
/// - `200 OK` - `ApiResponse` with `data = {status, total_chunks, processed_chunks, progress}`.
///   `status` is `null` only when the job has counters but no status key.
/// - `404 Not Found` - Nothing is known about the job
/// - `503 Service Unavailable` - Progress store unreachable
#[tracing::instrument(skip(progress), fields(job_id = %job_id))]
async fn get_processing_status(
    State(progress): State<Arc<dyn ProgressStore>>,
    Path(job_id): Path<String>,
) -> Result<Response, StatusApiError> {
    let report =
        super::queries::get::handle(progress, GetProcessingStatusQuery { job_id }).await?;

    Ok((StatusCode::OK, Json(ApiResponse::success(report))).into_response())
}

#[derive(Debug)]
struct StatusApiError(GetProcessingStatusError);

impl From<GetProcessingStatusError> for StatusApiError {
    fn from(err: GetProcessingStatusError) -> Self {
        Self(err)
    }
}

impl IntoResponse for StatusApiError {
    fn into_response(self) -> Response {
        match self.0 {
            GetProcessingStatusError::JobIdRequired => {
                let error = ErrorResponse::new("VALIDATION_ERROR", self.0.to_string());
                (StatusCode::BAD_REQUEST, Json(error)).into_response()
            },
            GetProcessingStatusError::NotFound(_) => {
                let error = ErrorResponse::new("NOT_FOUND", self.0.to_string());
                (StatusCode::NOT_FOUND, Json(error)).into_response()
            },
            GetProcessingStatusError::Progress(ref e) => {
                tracing::error!("Progress store error while reading status: {}", e);
                let error =
                    ErrorResponse::new("SERVICE_UNAVAILABLE", "Progress store is unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, Json(error)).into_response()
            },
        }
    }
}

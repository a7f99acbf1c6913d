//! Product API routes
//!
//! # Route Structure
//!
//! - `POST /api/v1/products` - Upload a JSON array of listings and start an ingestion job
//! - `GET /api/v1/products` - List ingested products with filters and pagination

use crate::api::response::{ApiResponse, ErrorResponse};
use axum::{
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use sqlx::PgPool;
use std::path::PathBuf;
use std::sync::Arc;

use super::{
    commands::{UploadProductsCommand, UploadProductsError},
    queries::{ListProductsError, ListProductsQuery},
};
use crate::ingest::framework::IngestionCoordinator;

/// State shared by the product routes
#[derive(Clone)]
pub struct ProductsState {
    pub db: PgPool,
    pub coordinator: Arc<IngestionCoordinator>,
    pub upload_dir: PathBuf,
}

// ============================================================================
// Router Configuration
// ============================================================================

pub fn products_routes(max_upload_bytes: usize) -> Router<ProductsState> {
    Router::new()
        .route("/", get(list_products).post(upload_products))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}

// ============================================================================
// Command Handlers (Write Operations)
// ============================================================================

/// Upload a listings file
///
/// # Endpoint
///
/// `POST /api/v1/products` with a multipart `file` field
///
/// # Response
///
/// - `202 Accepted` - File stored and job started, body carries the `job_id`
/// - `400 Bad Request` - No file, empty file or unreadable multipart body
/// - `503 Service Unavailable` - Progress store unreachable
#[tracing::instrument(skip(state, multipart))]
async fn upload_products(
    State(state): State<ProductsState>,
    mut multipart: Multipart,
) -> Result<Response, ProductApiError> {
    let mut upload: Option<UploadProductsCommand> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ProductApiError::Multipart(e.to_string()))?
    {
        if field.name() == Some("file") {
            let file_name = field.file_name().unwrap_or("upload.json").to_string();
            let data = field
                .bytes()
                .await
                .map_err(|e| ProductApiError::Multipart(e.to_string()))?;
            upload = Some(UploadProductsCommand {
                file_name,
                content: data.to_vec(),
            });
        }
    }

    let command = upload.ok_or(UploadProductsError::FileRequired)?;
    let response =
        super::commands::upload::handle(state.coordinator, state.upload_dir, command).await?;

    tracing::info!(job_id = %response.job_id, "Ingestion job started via API");

    Ok((StatusCode::ACCEPTED, Json(ApiResponse::success(response))).into_response())
}

// ============================================================================
// Query Handlers (Read Operations)
// ============================================================================

/// List products
///
/// # Endpoint
///
/// `GET /api/v1/products?product_name=&country=&page=1&per_page=20`
///
/// Filters are exact matches. Rows are ordered by country, descending.
#[tracing::instrument(skip(state, query), fields(page = ?query.page, per_page = ?query.per_page))]
async fn list_products(
    State(state): State<ProductsState>,
    Query(query): Query<ListProductsQuery>,
) -> Result<Response, ProductApiError> {
    let response = super::queries::list::handle(state.db, query).await?;

    tracing::debug!(
        count = response.items.len(),
        total = response.pagination.total,
        "Products listed via API"
    );

    let meta = json!({
        "pagination": response.pagination,
        "countries": response.countries,
    });

    Ok(
        (StatusCode::OK, Json(ApiResponse::success_with_meta(response.items, meta)))
            .into_response(),
    )
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
enum ProductApiError {
    Multipart(String),
    UploadError(UploadProductsError),
    ListError(ListProductsError),
}

impl From<UploadProductsError> for ProductApiError {
    fn from(err: UploadProductsError) -> Self {
        Self::UploadError(err)
    }
}

impl From<ListProductsError> for ProductApiError {
    fn from(err: ListProductsError) -> Self {
        Self::ListError(err)
    }
}

impl IntoResponse for ProductApiError {
    fn into_response(self) -> Response {
        match self {
            ProductApiError::Multipart(_)
            | ProductApiError::UploadError(UploadProductsError::FileRequired)
            | ProductApiError::UploadError(UploadProductsError::FilenameRequired)
            | ProductApiError::UploadError(UploadProductsError::FilenameLength)
            | ProductApiError::UploadError(UploadProductsError::ContentRequired) => {
                let error = ErrorResponse::new("VALIDATION_ERROR", self.to_string());
                (StatusCode::BAD_REQUEST, Json(error)).into_response()
            },
            ProductApiError::UploadError(UploadProductsError::Io(_)) => {
                tracing::error!("Failed to store upload: {}", self);
                let error = ErrorResponse::new("STORAGE_ERROR", "Failed to store the uploaded file");
                (StatusCode::INTERNAL_SERVER_ERROR, Json(error)).into_response()
            },
            ProductApiError::UploadError(UploadProductsError::Progress(_)) => {
                tracing::error!("Failed to register job: {}", self);
                let error =
                    ErrorResponse::new("SERVICE_UNAVAILABLE", "Progress store is unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, Json(error)).into_response()
            },
            ProductApiError::ListError(ListProductsError::Database(_)) => {
                tracing::error!("Database error while listing products: {}", self);
                let error = ErrorResponse::new("INTERNAL_ERROR", "A database error occurred");
                (StatusCode::INTERNAL_SERVER_ERROR, Json(error)).into_response()
            },
        }
    }
}

impl std::fmt::Display for ProductApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Multipart(e) => write!(f, "Invalid multipart body: {}", e),
            Self::UploadError(e) => write!(f, "{}", e),
            Self::ListError(e) => write!(f, "{}", e),
        }
    }
}

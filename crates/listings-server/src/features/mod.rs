//! Feature modules implementing the listings API
//!
//! Each feature is a vertical slice with its own commands, queries and routes.
//!
//! # Features
//!
//! - **products**: Upload listing files for ingestion, list ingested products
//! - **processing_status**: Progress of ingestion jobs
//!
//! # Architecture
//!
//! Each feature module follows the structure:
//! - `commands/` - Write operations
//! - `queries/` - Read operations
//! - `routes.rs` - HTTP route definitions
//!
//! Commands and queries implement the mediator pattern using the `mediator` crate.

pub mod processing_status;
pub mod products;
pub mod shared;

use axum::Router;
use std::path::PathBuf;
use std::sync::Arc;

use crate::ingest::framework::{IngestionCoordinator, ProgressStore};

/// Shared state for all feature routes
#[derive(Clone)]
pub struct FeatureState {
    /// PostgreSQL connection pool for the products table
    pub db: sqlx::PgPool,
    /// Job progress, read by the status endpoint
    pub progress: Arc<dyn ProgressStore>,
    /// Starts ingestion jobs for uploaded files
    pub coordinator: Arc<IngestionCoordinator>,
    /// Directory uploaded files are written to
    pub upload_dir: PathBuf,
    /// Request body limit for uploads
    pub max_upload_bytes: usize,
}

/// Creates the API router with all feature routes mounted
///
/// - `/products` - Upload and list products
/// - `/processing_status` - Ingestion job progress
pub fn router(state: FeatureState) -> Router<()> {
    let products_state = products::ProductsState {
        db: state.db.clone(),
        coordinator: state.coordinator.clone(),
        upload_dir: state.upload_dir.clone(),
    };

    Router::new()
        .nest(
            "/products",
            products::products_routes(state.max_upload_bytes).with_state(products_state),
        )
        .nest(
            "/processing_status",
            processing_status::processing_status_routes().with_state(state.progress.clone()),
        )
}

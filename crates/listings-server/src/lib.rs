//! Listings Server Library
//!
//! HTTP server and chunked ingestion pipeline for product listings.
//!
//! # Overview
//!
//! - **Ingestion**: uploaded JSON arrays are split into chunks, sanitized,
//!   normalized, filtered and written to PostgreSQL and MongoDB
//! - **Progress tracking**: per-job counters and status in Redis (or in memory)
//! - **API Endpoints**: upload, processing status and product listing
//! - **Configuration**: Environment-based configuration management
//! - **Middleware**: CORS and request logging
//!
//! # Architecture
//!
//! Routes are thin: each feature slice validates its input and calls a
//! command or query handler. Upload handlers hand the file to the
//! [`IngestionCoordinator`](ingest::framework::IngestionCoordinator), which
//! enqueues chunks for [`ChunkWorker`](ingest::framework::ChunkWorker)s and
//! returns. Workers and pollers only meet in the progress store.
//!
//! ## Framework Stack
//!
//! - **Axum**: HTTP routing and extractors
//! - **SQLx**: PostgreSQL pool and migrations
//! - **MongoDB / Redis**: document sink and progress store
//! - **Tower**: Middleware and service abstractions

pub mod api;
pub mod config;
pub mod cqrs;
pub mod error;
pub mod features;
pub mod ingest;
pub mod middleware;

// Re-export commonly used types
pub use error::AppError;

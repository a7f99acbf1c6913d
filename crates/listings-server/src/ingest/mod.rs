//! Listing ingestion
//!
//! # Architecture
//!
//! - **framework**: chunking, sanitize/normalize stages, sink fan-out, the
//!   chunk queue and the progress store interface
//! - **sinks**: Postgres `products` table and MongoDB listing collection
//! - **progress**: Redis and in-memory progress stores
//! - **config**: `INGEST_*`, `PROGRESS_*`, `REDIS_URL` and `MONGODB_*` settings
//!
//! # Public API
//!
//! Jobs are started and observed through `features::products` and
//! `features::processing_status`:
//! - `POST /api/v1/products` - Upload a JSON file and start a job
//! - `GET /api/v1/processing_status/:job_id` - Job progress

pub mod config;
pub mod framework;
pub mod progress;
pub mod sinks;

pub use config::{IngestConfig, MongoConfig, ProgressBackend, ProgressConfig};
pub use framework::{IngestionCoordinator, ProgressStore};

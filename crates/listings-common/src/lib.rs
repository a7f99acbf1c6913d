//! Listings Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, logging and error handling for the listings workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`ListingsError`] and the crate-wide [`Result`] alias
//! - **Logging**: environment-driven `tracing` subscriber setup
//! - **Types**: job status vocabulary shared by the ingestion pipeline and
//!   anything that polls it
//!
//! # Example
//!
//! ```no_run
//! use listings_common::types::{JobSnapshot, JobStatus, JobStatusReport};
//!
//! let snapshot = JobSnapshot {
//!     status: Some(JobStatus::Processing),
//!     total_chunks: 10,
//!     processed_chunks: 5,
//!     file_name: None,
//! };
//! let report = JobStatusReport::from(snapshot);
//! assert_eq!(report.progress, 50.0);
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{ListingsError, Result};

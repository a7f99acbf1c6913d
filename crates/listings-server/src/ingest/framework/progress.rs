//! Shared per-job progress state
//!
//! Workers never talk to each other; the only shared state of a job lives in a
//! [`ProgressStore`] under `<prefix>:<job_id>:<field>` keys. Every mutation is a
//! single atomic store operation:
//!
//! - `increment_processed` returns the post-increment count, so exactly one
//!   worker observes `n == total_chunks`
//! - `transition_status` is a compare-and-set, so a terminal status is written
//!   at most once and `completed` never overwrites `error`

use async_trait::async_trait;
use listings_common::types::{JobField, JobSnapshot, JobStatus};

/// Default key namespace, shared with existing status pollers
pub const DEFAULT_KEY_PREFIX: &str = "data_processing";

#[derive(Debug, thiserror::Error)]
pub enum ProgressError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("Corrupt value for {key}: {value}")]
    Corrupt { key: String, value: String },
}

pub type ProgressResult<T> = std::result::Result<T, ProgressError>;

/// Builds `<prefix>:<job_id>:<field>` keys
#[derive(Debug, Clone)]
pub struct KeySpace {
    prefix: String,
}

impl KeySpace {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn key(&self, job_id: &str, field: JobField) -> String {
        format!("{}:{}:{}", self.prefix, job_id, field.as_str())
    }
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_PREFIX)
    }
}

#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Record a freshly uploaded job as `pending`
    async fn register(&self, job_id: &str, file_name: &str) -> ProgressResult<()>;

    /// Write `total_chunks`, reset `processed_chunks` and mark `processing`
    async fn set_initial(&self, job_id: &str, total_chunks: u64) -> ProgressResult<()>;

    /// Atomically add one processed chunk and return the new count
    async fn increment_processed(&self, job_id: &str) -> ProgressResult<u64>;

    /// Overwrite the status unconditionally
    async fn set_status(&self, job_id: &str, status: JobStatus) -> ProgressResult<()>;

    /// Set `to` only if the current status is `from` and `from -> to` is a
    /// legal move. Returns whether it did.
    async fn transition_status(
        &self,
        job_id: &str,
        from: JobStatus,
        to: JobStatus,
    ) -> ProgressResult<bool>;

    /// Current state, or `None` when nothing is known about the job
    async fn snapshot(&self, job_id: &str) -> ProgressResult<Option<JobSnapshot>>;

    /// Check that the backing store is reachable
    async fn ping(&self) -> ProgressResult<()> {
        Ok(())
    }
}

/// Parse a stored counter. Missing keys count as zero.
pub(crate) fn parse_count(key: &str, raw: Option<String>) -> ProgressResult<u64> {
    match raw {
        None => Ok(0),
        Some(value) => value.trim().parse().map_err(|_| ProgressError::Corrupt {
            key: key.to_string(),
            value,
        }),
    }
}

/// Parse a stored status. Missing keys mean no status yet.
pub(crate) fn parse_status(key: &str, raw: Option<String>) -> ProgressResult<Option<JobStatus>> {
    match raw {
        None => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ProgressError::Corrupt {
                key: key.to_string(),
                value,
            }),
    }
}

/// Assemble a snapshot from the four raw fields, `None` when all are absent
pub(crate) fn snapshot_from_raw(
    keys: &KeySpace,
    job_id: &str,
    status: Option<String>,
    total: Option<String>,
    processed: Option<String>,
    file_name: Option<String>,
) -> ProgressResult<Option<JobSnapshot>> {
    if status.is_none() && total.is_none() && processed.is_none() && file_name.is_none() {
        return Ok(None);
    }

    Ok(Some(JobSnapshot {
        status: parse_status(&keys.key(job_id, JobField::Status), status)?,
        total_chunks: parse_count(&keys.key(job_id, JobField::TotalChunks), total)?,
        processed_chunks: parse_count(&keys.key(job_id, JobField::ProcessedChunks), processed)?,
        file_name,
    }))
}

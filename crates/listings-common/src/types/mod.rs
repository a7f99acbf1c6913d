//! Job status vocabulary shared by the ingestion pipeline and its observers

use serde::{Deserialize, Serialize};

use crate::error::ListingsError;

/// Lifecycle state of an ingestion job.
///
/// The only legal moves are `pending -> processing -> {completed | error}`.
/// `pending` may also fail straight to `error` when the source file cannot be
/// read before any chunk is dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
        }
    }

    /// Whether `self -> next` is a legal transition. Nothing leaves
    /// `completed` or `error`, so pollers must stop on `error` even though
    /// `processed_chunks` may never reach `total_chunks`.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Pending, JobStatus::Error)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Error)
        )
    }
}

impl std::str::FromStr for JobStatus {
    type Err = ListingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "error" => Ok(JobStatus::Error),
            other => Err(ListingsError::InvalidJobStatus(other.to_string())),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-job fields kept in the progress store, one key each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobField {
    Status,
    TotalChunks,
    ProcessedChunks,
    FileName,
}

impl JobField {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobField::Status => "status",
            JobField::TotalChunks => "total_chunks",
            JobField::ProcessedChunks => "processed_chunks",
            JobField::FileName => "file_name",
        }
    }
}

/// Raw view of a job as read from the progress store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub status: Option<JobStatus>,
    pub total_chunks: u64,
    pub processed_chunks: u64,
    pub file_name: Option<String>,
}

/// Status payload returned to pollers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusReport {
    pub status: Option<JobStatus>,
    pub total_chunks: u64,
    pub processed_chunks: u64,
    /// Percentage rounded to two decimals, `0` when there are no chunks
    pub progress: f64,
}

impl From<JobSnapshot> for JobStatusReport {
    fn from(snapshot: JobSnapshot) -> Self {
        Self {
            status: snapshot.status,
            total_chunks: snapshot.total_chunks,
            processed_chunks: snapshot.processed_chunks,
            progress: progress_percentage(snapshot.processed_chunks, snapshot.total_chunks),
        }
    }
}

/// `processed / total * 100` rounded to two decimal places, or `0.0` for an
/// empty job.
pub fn progress_percentage(processed_chunks: u64, total_chunks: u64) -> f64 {
    if total_chunks == 0 {
        return 0.0;
    }
    let raw = processed_chunks as f64 / total_chunks as f64 * 100.0;
    (raw * 100.0).round() / 100.0
}

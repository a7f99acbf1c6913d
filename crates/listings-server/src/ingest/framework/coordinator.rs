//! Ingestion job coordinator
//!
//! Turns one uploaded file into chunk tasks:
//! 1. Repair invalid UTF-8, then read and parse the whole JSON array (fatal on failure, nothing written)
//! 2. Record `total_chunks` and mark the job `processing`
//! 3. Partition into consecutive chunks, sanitize each on the blocking pool and
//!    enqueue it, with a bounded number of chunks in flight
//!
//! The coordinator's job ends at enqueue; chunk outcomes only show up in the
//! progress store.

use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use listings_common::types::JobStatus;

use super::progress::{ProgressError, ProgressStore};
use super::queue::{ChunkQueue, QueueError};
use super::sanitizer::{repair_utf8, sanitize_chunk, RawValue};
use super::types::{BatchConfig, ChunkTask};

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Source file {path} is unavailable: {source}")]
    SourceUnavailable {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Input is not a JSON array of records: {0}")]
    MalformedInput(#[source] serde_json::Error),
    #[error("Progress store error: {0}")]
    Progress(#[from] ProgressError),
    #[error("Failed to enqueue chunk {chunk_index}: {source}")]
    Enqueue {
        chunk_index: usize,
        #[source]
        source: QueueError,
    },
    #[error("Dispatch task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// What was handed to the queue for one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchSummary {
    pub total_records: usize,
    pub total_chunks: u64,
}

pub struct IngestionCoordinator {
    progress: Arc<dyn ProgressStore>,
    queue: Arc<dyn ChunkQueue>,
    config: BatchConfig,
}

impl IngestionCoordinator {
    pub fn new(
        progress: Arc<dyn ProgressStore>,
        queue: Arc<dyn ChunkQueue>,
        config: BatchConfig,
    ) -> Self {
        Self {
            progress,
            queue,
            config,
        }
    }

    pub fn progress(&self) -> &Arc<dyn ProgressStore> {
        &self.progress
    }

    /// Run [`start_job`](Self::start_job) in the background, logging the outcome
    pub fn spawn_job(self: &Arc<Self>, path: PathBuf, job_id: String) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = coordinator.start_job(&path, &job_id).await {
                error!(job_id = %job_id, error = %e, "Ingestion job failed before dispatch completed");
            }
        })
    }

    /// Read the file at `path` and dispatch its records
    #[tracing::instrument(skip(self, path), fields(job_id = %job_id, path = %path.as_ref().display()))]
    pub async fn start_job(
        &self,
        path: impl AsRef<Path>,
        job_id: &str,
    ) -> Result<DispatchSummary, IngestError> {
        let path = path.as_ref();
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(source) => {
                error!(job_id, error = %source, "File not found or unreadable");
                self.fail_pending(job_id).await;
                return Err(IngestError::SourceUnavailable {
                    path: path.display().to_string(),
                    source,
                });
            },
        };

        self.dispatch(bytes, job_id).await
    }

    /// Parse `bytes` as a JSON array and enqueue it chunk by chunk
    pub async fn dispatch(
        &self,
        bytes: Vec<u8>,
        job_id: &str,
    ) -> Result<DispatchSummary, IngestError> {
        let parsed = tokio::task::spawn_blocking(move || {
            serde_json::from_slice::<Vec<RawValue>>(&repair_utf8(&bytes))
        })
        .await?;
        let records = match parsed {
            Ok(records) => records,
            Err(e) => {
                error!(job_id, error = %e, "Error parsing JSON file");
                self.fail_pending(job_id).await;
                return Err(IngestError::MalformedInput(e));
            },
        };

        let summary = DispatchSummary {
            total_records: records.len(),
            total_chunks: self.config.total_chunks(records.len()),
        };
        let total_chunks = summary.total_chunks;

        self.progress.set_initial(job_id, total_chunks).await?;

        if total_chunks == 0 {
            self.progress
                .transition_status(job_id, JobStatus::Processing, JobStatus::Completed)
                .await?;
            info!(job_id, "Input is empty, job completed without chunks");
            return Ok(summary);
        }

        let chunk_size = self.config.chunk_size.max(1);
        let mut remaining = records.into_iter();
        let chunks = (0..total_chunks as usize).map(move |chunk_index| {
            let chunk: Vec<RawValue> = remaining.by_ref().take(chunk_size).collect();
            (chunk_index, chunk)
        });

        let mut enqueued = stream::iter(chunks)
            .map(|(chunk_index, chunk)| {
                let queue = Arc::clone(&self.queue);
                let job_id = job_id.to_string();
                async move {
                    let records = tokio::task::spawn_blocking(move || sanitize_chunk(chunk)).await?;
                    queue
                        .enqueue(ChunkTask {
                            job_id,
                            chunk_index,
                            total_chunks,
                            records,
                        })
                        .await
                        .map_err(|source| IngestError::Enqueue {
                            chunk_index,
                            source,
                        })
                }
            })
            .buffer_unordered(self.config.dispatch_concurrency.max(1));

        while let Some(result) = enqueued.next().await {
            if let Err(e) = result {
                error!(job_id, error = %e, "Failed to dispatch chunk");
                self.fail_processing(job_id).await;
                return Err(e);
            }
        }

        info!(
            job_id,
            total_chunks,
            total_records = summary.total_records,
            "Enqueued chunks for processing"
        );
        Ok(summary)
    }

    /// Input errors happen before any counters exist; only a job registered by
    /// the upload endpoint is moved to `error`
    async fn fail_pending(&self, job_id: &str) {
        self.transition_or_log(job_id, JobStatus::Pending, JobStatus::Error)
            .await;
    }

    async fn fail_processing(&self, job_id: &str) {
        self.transition_or_log(job_id, JobStatus::Processing, JobStatus::Error)
            .await;
    }

    async fn transition_or_log(&self, job_id: &str, from: JobStatus, to: JobStatus) {
        match self.progress.transition_status(job_id, from, to).await {
            Ok(true) => {},
            Ok(false) => warn!(job_id, from = %from, to = %to, "Job status was not changed"),
            Err(e) => error!(job_id, error = %e, "Failed to update job status"),
        }
    }
}

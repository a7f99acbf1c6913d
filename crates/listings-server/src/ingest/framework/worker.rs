//! Chunk worker
//!
//! Processes one [`ChunkTask`]: normalizes and filters its records on the
//! blocking pool, writes the eligible listings in sub-batches through the
//! [`SinkWriter`], then records progress. A failed chunk moves the job to
//! `error` and is not counted as processed.

use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

use listings_common::types::JobStatus;

use super::normalizer::{NormalizeError, Normalizer};
use super::progress::{ProgressError, ProgressStore};
use super::sink::{BatchContext, SinkWriteError, SinkWriter};
use super::types::{BatchConfig, CanonicalRecord, ChunkStats, ChunkTask};

#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    #[error("Record {index} could not be normalized: {source}")]
    Normalize {
        index: usize,
        #[source]
        source: NormalizeError,
    },
    #[error(transparent)]
    Sink(#[from] SinkWriteError),
    #[error("Progress store error: {0}")]
    Progress(#[from] ProgressError),
    #[error("Normalization task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Runs the normalize, persist and report stages for one chunk
#[derive(Clone)]
pub struct ChunkWorker {
    normalizer: Arc<Normalizer>,
    writer: SinkWriter,
    progress: Arc<dyn ProgressStore>,
    config: BatchConfig,
}

impl ChunkWorker {
    pub fn new(
        normalizer: Arc<Normalizer>,
        writer: SinkWriter,
        progress: Arc<dyn ProgressStore>,
        config: BatchConfig,
    ) -> Self {
        Self {
            normalizer,
            writer,
            progress,
            config,
        }
    }

    #[tracing::instrument(
        skip(self, task),
        fields(job_id = %task.job_id, chunk_index = task.chunk_index, records = task.records.len())
    )]
    pub async fn process(&self, task: ChunkTask) -> Result<ChunkStats, ChunkError> {
        let job_id = task.job_id.clone();
        let chunk_index = task.chunk_index;

        match self.run(task).await {
            Ok(stats) => Ok(stats),
            Err(e) => {
                error!(job_id = %job_id, chunk_index, error = %e, "Error processing chunk");
                self.mark_failed(&job_id).await;
                Err(e)
            },
        }
    }

    async fn run(&self, task: ChunkTask) -> Result<ChunkStats, ChunkError> {
        let ChunkTask {
            job_id,
            chunk_index,
            total_chunks,
            records,
        } = task;

        let normalizer = self.normalizer.clone();
        let batch_size = self.config.store_batch_size.max(1);
        let (batches, mut stats) = tokio::task::spawn_blocking(move || {
            normalize_chunk(&normalizer, records, batch_size)
        })
        .await??;

        let ctx = BatchContext {
            job_id: &job_id,
            chunk_index,
        };
        for batch in batches.iter().filter(|b| !b.is_empty()) {
            stats.batches += 1;
            if let Err(e) = self.writer.write_batch(ctx, batch).await {
                stats.sink_failures += e.failures.len();
                if self.config.sink_errors_fatal {
                    return Err(e.into());
                }
            }
        }

        let processed = self.progress.increment_processed(&job_id).await?;
        if processed >= total_chunks
            && self
                .progress
                .transition_status(&job_id, JobStatus::Processing, JobStatus::Completed)
                .await?
        {
            info!(job_id = %job_id, total_chunks, "All chunks processed for job");
        }

        if stats.sink_failures > 0 {
            warn!(
                job_id = %job_id,
                chunk_index,
                sink_failures = stats.sink_failures,
                "Chunk processed with sink failures"
            );
        }
        info!(
            job_id = %job_id,
            chunk_index,
            processed,
            total_chunks,
            eligible = stats.eligible,
            skipped = stats.skipped,
            "Processed chunk"
        );

        Ok(stats)
    }

    async fn mark_failed(&self, job_id: &str) {
        match self
            .progress
            .transition_status(job_id, JobStatus::Processing, JobStatus::Error)
            .await
        {
            Ok(true) => {},
            Ok(false) => warn!(job_id, "Job was no longer processing when the chunk failed"),
            Err(e) => error!(job_id, error = %e, "Failed to mark job as errored"),
        }
    }
}

/// Normalize every record and group the eligible ones by source sub-batch.
/// The first structurally invalid record aborts the whole chunk.
fn normalize_chunk(
    normalizer: &Normalizer,
    records: Vec<Value>,
    batch_size: usize,
) -> Result<(Vec<Vec<CanonicalRecord>>, ChunkStats), ChunkError> {
    let mut stats = ChunkStats {
        received: records.len(),
        ..Default::default()
    };
    let mut batches = Vec::with_capacity(records.len().div_ceil(batch_size));

    for (batch_no, source) in records.chunks(batch_size).enumerate() {
        let mut batch = Vec::with_capacity(source.len());
        for (offset, raw) in source.iter().enumerate() {
            let record = normalizer
                .normalize(raw)
                .map_err(|source| ChunkError::Normalize {
                    index: batch_no * batch_size + offset,
                    source,
                })?;
            if Normalizer::is_eligible(raw, &record) {
                batch.push(record);
            } else {
                stats.skipped += 1;
            }
        }
        stats.eligible += batch.len();
        batches.push(batch);
    }

    Ok((batches, stats))
}

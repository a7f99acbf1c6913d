//! Sink interface and the dual-sink batch writer
//!
//! Each [`RecordSink`] persists canonical listings into one store. The
//! [`SinkWriter`] fans a batch out to every configured sink at once; a failing
//! sink is logged and reported but neither blocks nor rolls back the others.

use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, error};

use super::types::CanonicalRecord;

/// A destination for canonical listings
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Short name used in logs ("postgres", "mongodb")
    fn name(&self) -> &str;

    /// Insert a batch, returning how many rows were actually written.
    ///
    /// Implementations must ignore rows that already exist under the
    /// `(url, product_id)` key so a re-run chunk does not duplicate listings.
    async fn insert_batch(&self, records: &[CanonicalRecord]) -> Result<u64>;
}

/// Identifies the chunk a batch belongs to, for log correlation
#[derive(Debug, Clone, Copy)]
pub struct BatchContext<'a> {
    pub job_id: &'a str,
    pub chunk_index: usize,
}

/// Outcome of one sink within a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkOutcome {
    pub sink: String,
    pub inserted: u64,
}

/// Successful writes of one batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub batch_size: usize,
    pub outcomes: Vec<SinkOutcome>,
}

/// A single sink's failure
#[derive(Debug)]
pub struct SinkFailure {
    pub sink: String,
    pub error: anyhow::Error,
}

#[derive(Debug, thiserror::Error)]
#[error("{} sink(s) failed for a batch of {batch_size} records: {}", .failures.len(), failed_sinks(.failures))]
pub struct SinkWriteError {
    pub batch_size: usize,
    /// Writes that succeeded alongside the failures
    pub report: BatchReport,
    pub failures: Vec<SinkFailure>,
}

fn failed_sinks(failures: &[SinkFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.sink, f.error))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Writes every batch to all configured sinks concurrently
#[derive(Clone)]
pub struct SinkWriter {
    sinks: Vec<Arc<dyn RecordSink>>,
}

impl SinkWriter {
    pub fn new(sinks: Vec<Arc<dyn RecordSink>>) -> Self {
        Self { sinks }
    }

    pub fn sink_names(&self) -> Vec<&str> {
        self.sinks.iter().map(|s| s.name()).collect()
    }

    /// Write `records` to every sink. No retries are attempted here.
    pub async fn write_batch(
        &self,
        ctx: BatchContext<'_>,
        records: &[CanonicalRecord],
    ) -> std::result::Result<BatchReport, SinkWriteError> {
        let batch_size = records.len();
        if batch_size == 0 {
            return Ok(BatchReport::default());
        }

        let results = join_all(self.sinks.iter().map(|sink| async move {
            (sink.name().to_string(), sink.insert_batch(records).await)
        }))
        .await;

        let mut report = BatchReport {
            batch_size,
            outcomes: Vec::with_capacity(results.len()),
        };
        let mut failures = Vec::new();

        for (sink, result) in results {
            match result {
                Ok(inserted) => {
                    debug!(
                        job_id = %ctx.job_id,
                        chunk_index = ctx.chunk_index,
                        batch_size,
                        sink = %sink,
                        inserted,
                        "Batch written"
                    );
                    report.outcomes.push(SinkOutcome { sink, inserted });
                },
                Err(e) => {
                    error!(
                        job_id = %ctx.job_id,
                        chunk_index = ctx.chunk_index,
                        batch_size,
                        sink = %sink,
                        error = %e,
                        "Error saving batch"
                    );
                    failures.push(SinkFailure { sink, error: e });
                },
            }
        }

        if failures.is_empty() {
            Ok(report)
        } else {
            Err(SinkWriteError {
                batch_size,
                report,
                failures,
            })
        }
    }
}

//! Core types for the chunked ingestion pipeline

use serde::{Deserialize, Serialize};

/// Reference number of source records per chunk
pub const DEFAULT_CHUNK_SIZE: usize = 10_000;

/// Reference number of source records per sink write
pub const DEFAULT_STORE_BATCH_SIZE: usize = 1_000;

/// Reference number of chunks sanitized and enqueued at once
pub const DEFAULT_DISPATCH_CONCURRENCY: usize = 4;

/// Reference number of chunk workers running at once
pub const DEFAULT_WORKER_CONCURRENCY: usize = 4;

/// Reference capacity of the local chunk queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Listing after normalization, ready for both sinks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub country: Option<String>,
    pub brand: String,
    pub product_id: i64,
    pub product_name: String,
    pub shop_name: Option<String>,
    pub product_category_id: i64,
    pub price: f64,
    pub url: String,
}

/// One bounded unit of work, addressed to a single job
///
/// Records are already sanitized, so every string is valid UTF-8.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkTask {
    pub job_id: String,
    pub chunk_index: usize,
    pub total_chunks: u64,
    pub records: Vec<serde_json::Value>,
}

/// Sizing knobs for the pipeline
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub chunk_size: usize,
    pub store_batch_size: usize,
    pub dispatch_concurrency: usize,
    /// Fail the chunk when any sink write fails
    pub sink_errors_fatal: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            store_batch_size: DEFAULT_STORE_BATCH_SIZE,
            dispatch_concurrency: DEFAULT_DISPATCH_CONCURRENCY,
            sink_errors_fatal: false,
        }
    }
}

impl BatchConfig {
    /// Number of chunks needed for `record_count` records
    pub fn total_chunks(&self, record_count: usize) -> u64 {
        record_count.div_ceil(self.chunk_size.max(1)) as u64
    }
}

/// Counters for a single processed chunk
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkStats {
    /// Records received in the chunk
    pub received: usize,
    /// Records that passed the eligibility filter
    pub eligible: usize,
    /// Records dropped by the eligibility filter
    pub skipped: usize,
    /// Sub-batches handed to the sink writer
    pub batches: usize,
    /// Individual sink writes that failed
    pub sink_failures: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_chunks_rounds_up() {
        let config = BatchConfig {
            chunk_size: 3,
            ..Default::default()
        };
        assert_eq!(config.total_chunks(0), 0);
        assert_eq!(config.total_chunks(1), 1);
        assert_eq!(config.total_chunks(3), 1);
        assert_eq!(config.total_chunks(7), 3);
    }

    #[test]
    fn test_default_batch_config() {
        let config = BatchConfig::default();
        assert_eq!(config.chunk_size, 10_000);
        assert_eq!(config.store_batch_size, 1_000);
        assert_eq!(config.dispatch_concurrency, 4);
        assert!(!config.sink_errors_fatal);
        assert_eq!(config.total_chunks(25_000), 3);
    }

    #[test]
    fn test_chunk_task_serializes() {
        let task = ChunkTask {
            job_id: "job-1".to_string(),
            chunk_index: 2,
            total_chunks: 5,
            records: vec![serde_json::json!({"brand": "acme"})],
        };
        let value = serde_json::to_value(&task).expect("serialize");
        assert_eq!(value["chunk_index"], 2);
        assert_eq!(value["records"][0]["brand"], "acme");
    }
}

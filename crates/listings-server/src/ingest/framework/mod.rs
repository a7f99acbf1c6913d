//! Chunked ingestion framework
//!
//! Splits one uploaded JSON array into chunks, runs them through sanitize,
//! normalize and filter stages and persists the surviving listings to every
//! configured sink. Job state lives in a [`ProgressStore`] shared by the
//! coordinator and the workers.

pub mod coordinator;
pub mod normalizer;
pub mod progress;
pub mod queue;
pub mod sanitizer;
pub mod sink;
pub mod types;
pub mod worker;

pub use coordinator::{DispatchSummary, IngestError, IngestionCoordinator};
pub use normalizer::{Denylist, NormalizeError, Normalizer};
pub use progress::{KeySpace, ProgressError, ProgressStore};
pub use queue::{ChunkQueue, LocalChunkQueue, QueueError};
pub use sanitizer::{repair_utf8, sanitize, sanitize_chunk, RawValue};
pub use sink::{BatchReport, RecordSink, SinkWriteError, SinkWriter};
pub use types::{BatchConfig, CanonicalRecord, ChunkStats, ChunkTask};
pub use worker::{ChunkError, ChunkWorker};

//! Ingestion configuration
//!
//! Pipeline sizing (`INGEST_*`), the progress store (`PROGRESS_*`, `REDIS_URL`)
//! and the document sink (`MONGODB_*`).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use super::framework::normalizer::Denylist;
use super::framework::progress::DEFAULT_KEY_PREFIX;
use super::framework::types::{
    BatchConfig, DEFAULT_CHUNK_SIZE, DEFAULT_DISPATCH_CONCURRENCY, DEFAULT_QUEUE_CAPACITY,
    DEFAULT_STORE_BATCH_SIZE, DEFAULT_WORKER_CONCURRENCY,
};

/// Default directory for uploaded files.
pub const DEFAULT_UPLOAD_DIR: &str = "uploads";

/// Default Redis URL for local development.
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Default MongoDB URL for local development.
pub const DEFAULT_MONGODB_URL: &str = "mongodb://localhost:27017";

/// Default MongoDB database name.
pub const DEFAULT_MONGODB_DATABASE: &str = "listings";

/// Default MongoDB collection for listing documents.
pub const DEFAULT_MONGODB_COLLECTION: &str = "external_records";

/// Pipeline sizing and upload handling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Source records per chunk
    pub chunk_size: usize,
    /// Source records per sink write
    pub store_batch_size: usize,
    /// Chunks sanitized and enqueued at once
    pub dispatch_concurrency: usize,
    /// Chunk workers running at once
    pub worker_concurrency: usize,
    /// Chunks that may wait in the queue
    pub queue_capacity: usize,
    /// Where uploaded files are written
    pub upload_dir: PathBuf,
    /// Tokens or phrases removed from country and shop names on top of the
    /// standard country codes
    pub denylist_extra: Vec<String>,
    /// Fail a chunk when any sink write fails
    pub sink_errors_fatal: bool,
}

impl IngestConfig {
    /// Load ingestion configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        let config = Self {
            chunk_size: env_parse("INGEST_CHUNK_SIZE", DEFAULT_CHUNK_SIZE),
            store_batch_size: env_parse("INGEST_STORE_BATCH_SIZE", DEFAULT_STORE_BATCH_SIZE),
            dispatch_concurrency: env_parse(
                "INGEST_DISPATCH_CONCURRENCY",
                DEFAULT_DISPATCH_CONCURRENCY,
            ),
            worker_concurrency: env_parse("INGEST_WORKER_CONCURRENCY", DEFAULT_WORKER_CONCURRENCY),
            queue_capacity: env_parse("INGEST_QUEUE_CAPACITY", DEFAULT_QUEUE_CAPACITY),
            upload_dir: std::env::var("INGEST_UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_UPLOAD_DIR)),
            denylist_extra: std::env::var("INGEST_DENYLIST_EXTRA")
                .map(|s| parse_list(&s))
                .unwrap_or_default(),
            sink_errors_fatal: env_parse("INGEST_SINK_ERRORS_FATAL", false),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.chunk_size == 0 {
            anyhow::bail!("INGEST_CHUNK_SIZE must be greater than 0");
        }
        if self.store_batch_size == 0 {
            anyhow::bail!("INGEST_STORE_BATCH_SIZE must be greater than 0");
        }
        if self.dispatch_concurrency == 0 {
            anyhow::bail!("INGEST_DISPATCH_CONCURRENCY must be greater than 0");
        }
        if self.worker_concurrency == 0 {
            anyhow::bail!("INGEST_WORKER_CONCURRENCY must be greater than 0");
        }
        if self.queue_capacity == 0 {
            anyhow::bail!("INGEST_QUEUE_CAPACITY must be greater than 0");
        }
        if self.upload_dir.as_os_str().is_empty() {
            anyhow::bail!("INGEST_UPLOAD_DIR cannot be empty");
        }
        Ok(())
    }

    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig {
            chunk_size: self.chunk_size,
            store_batch_size: self.store_batch_size,
            dispatch_concurrency: self.dispatch_concurrency,
            sink_errors_fatal: self.sink_errors_fatal,
        }
    }

    /// Compile the standard denylist plus the configured extras
    pub fn denylist(&self) -> Result<Denylist, regex::Error> {
        Denylist::with_extra(&self.denylist_extra)
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            store_batch_size: DEFAULT_STORE_BATCH_SIZE,
            dispatch_concurrency: DEFAULT_DISPATCH_CONCURRENCY,
            worker_concurrency: DEFAULT_WORKER_CONCURRENCY,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            upload_dir: PathBuf::from(DEFAULT_UPLOAD_DIR),
            denylist_extra: Vec::new(),
            sink_errors_fatal: false,
        }
    }
}

/// Where job progress is kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressBackend {
    /// Shared Redis instance
    Redis,
    /// In-process map, single server only
    Memory,
}

impl FromStr for ProgressBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "memory" => Ok(Self::Memory),
            other => anyhow::bail!("Unknown PROGRESS_BACKEND '{}', expected redis or memory", other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressConfig {
    pub backend: ProgressBackend,
    pub redis_url: String,
    pub key_prefix: String,
}

impl ProgressConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let config = Self {
            backend: match std::env::var("PROGRESS_BACKEND") {
                Ok(value) => value.parse()?,
                Err(_) => ProgressBackend::Redis,
            },
            redis_url: std::env::var("REDIS_URL").unwrap_or_else(|_| DEFAULT_REDIS_URL.to_string()),
            key_prefix: std::env::var("PROGRESS_KEY_PREFIX")
                .unwrap_or_else(|_| DEFAULT_KEY_PREFIX.to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.key_prefix.is_empty() {
            anyhow::bail!("PROGRESS_KEY_PREFIX cannot be empty");
        }
        if self.backend == ProgressBackend::Redis && self.redis_url.is_empty() {
            anyhow::bail!("REDIS_URL cannot be empty when PROGRESS_BACKEND is redis");
        }
        Ok(())
    }
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            backend: ProgressBackend::Redis,
            redis_url: DEFAULT_REDIS_URL.to_string(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoConfig {
    pub url: String,
    pub database: String,
    pub collection: String,
}

impl MongoConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let config = Self {
            url: std::env::var("MONGODB_URL").unwrap_or_else(|_| DEFAULT_MONGODB_URL.to_string()),
            database: std::env::var("MONGODB_DATABASE")
                .unwrap_or_else(|_| DEFAULT_MONGODB_DATABASE.to_string()),
            collection: std::env::var("MONGODB_COLLECTION")
                .unwrap_or_else(|_| DEFAULT_MONGODB_COLLECTION.to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.url.is_empty() {
            anyhow::bail!("MONGODB_URL cannot be empty");
        }
        if self.database.is_empty() || self.collection.is_empty() {
            anyhow::bail!("MONGODB_DATABASE and MONGODB_COLLECTION cannot be empty");
        }
        Ok(())
    }
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_MONGODB_URL.to_string(),
            database: DEFAULT_MONGODB_DATABASE.to_string(),
            collection: DEFAULT_MONGODB_COLLECTION.to_string(),
        }
    }
}

fn env_parse<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

/// Comma separated list, blanks dropped
fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

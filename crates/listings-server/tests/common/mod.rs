//! Common test utilities for listings server integration tests
//!
//! Containers for the stores the pipeline talks to, plus in-process doubles
//! for running whole ingestion jobs without any of them.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::TestPostgres;
//!
//! #[tokio::test]
//! #[ignore]
//! async fn test_with_postgres() {
//!     let pg = TestPostgres::start().await.expect("Failed to start PostgreSQL");
//!     sqlx::query("SELECT 1").execute(pg.pool()).await.expect("Query failed");
//! }
//! ```

#![allow(dead_code)]

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use testcontainers::{core::IntoContainerPort, runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::{mongo::Mongo, postgres::Postgres, redis::Redis};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::info;

use listings_common::types::{JobSnapshot, JobStatus};
use listings_server::ingest::framework::{
    BatchConfig, CanonicalRecord, ChunkWorker, Denylist, IngestionCoordinator, KeySpace,
    LocalChunkQueue, Normalizer, ProgressStore, RecordSink, SinkWriter,
};
use listings_server::ingest::progress::MemoryProgressStore;

// ============================================================================
// PostgreSQL Test Container
// ============================================================================

/// PostgreSQL container with the listings migrations applied
pub struct TestPostgres {
    container: ContainerAsync<Postgres>,
    pool: PgPool,
    connection_string: String,
}

impl TestPostgres {
    pub async fn start() -> Result<Self> {
        info!("Starting PostgreSQL test container...");

        let container = Postgres::default()
            .with_tag("16-alpine")
            .start()
            .await
            .context("Failed to start PostgreSQL container")?;

        let host = container
            .get_host()
            .await
            .context("Failed to get container host")?;
        let port = container
            .get_host_port_ipv4(5432.tcp())
            .await
            .context("Failed to get container port")?;

        let connection_string =
            format!("postgresql://postgres:postgres@{}:{}/postgres", host, port);

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&connection_string)
            .await
            .context("Failed to connect to PostgreSQL")?;

        sqlx::migrate!("../../migrations")
            .run(&pool)
            .await
            .context("Failed to run migrations")?;

        Ok(Self {
            container,
            pool,
            connection_string,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn pool_clone(&self) -> PgPool {
        self.pool.clone()
    }

    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }
}

// ============================================================================
// Redis Test Container
// ============================================================================

pub struct TestRedis {
    container: ContainerAsync<Redis>,
    url: String,
}

impl TestRedis {
    pub async fn start() -> Result<Self> {
        info!("Starting Redis test container...");

        let container = Redis::default()
            .start()
            .await
            .context("Failed to start Redis container")?;
        let host = container.get_host().await.context("Failed to get host")?;
        let port = container
            .get_host_port_ipv4(6379.tcp())
            .await
            .context("Failed to get port")?;

        Ok(Self {
            container,
            url: format!("redis://{}:{}", host, port),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

// ============================================================================
// MongoDB Test Container
// ============================================================================

pub struct TestMongo {
    container: ContainerAsync<Mongo>,
    url: String,
}

impl TestMongo {
    pub async fn start() -> Result<Self> {
        info!("Starting MongoDB test container...");

        let container = Mongo::default()
            .start()
            .await
            .context("Failed to start MongoDB container")?;
        let host = container.get_host().await.context("Failed to get host")?;
        let port = container
            .get_host_port_ipv4(27017.tcp())
            .await
            .context("Failed to get port")?;

        Ok(Self {
            container,
            url: format!("mongodb://{}:{}", host, port),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

// ============================================================================
// In-process Pipeline
// ============================================================================

/// Sink that keeps everything it is given, optionally failing every write
pub struct RecordingSink {
    name: &'static str,
    fail: bool,
    pub written: Mutex<Vec<CanonicalRecord>>,
}

impl RecordingSink {
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            fail: false,
            written: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            fail: true,
            written: Mutex::new(Vec::new()),
        })
    }

    pub async fn records(&self) -> Vec<CanonicalRecord> {
        self.written.lock().await.clone()
    }
}

#[async_trait]
impl RecordSink for RecordingSink {
    fn name(&self) -> &str {
        self.name
    }

    async fn insert_batch(&self, records: &[CanonicalRecord]) -> Result<u64> {
        if self.fail {
            anyhow::bail!("{} is down", self.name);
        }
        let mut written = self.written.lock().await;
        // Same (url, product_id) dedupe the real sinks get from their indexes
        let mut inserted = 0;
        for record in records {
            let duplicate = written
                .iter()
                .any(|r| r.url == record.url && r.product_id == record.product_id);
            if !duplicate {
                written.push(record.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }
}

/// Coordinator, queue and workers wired to a memory progress store
pub struct TestPipeline {
    pub coordinator: Arc<IngestionCoordinator>,
    pub progress: Arc<MemoryProgressStore>,
    queue_handle: JoinHandle<()>,
}

impl TestPipeline {
    pub fn start(sinks: Vec<Arc<dyn RecordSink>>, config: BatchConfig) -> Self {
        let progress = Arc::new(MemoryProgressStore::new(KeySpace::default()));
        let store: Arc<dyn ProgressStore> = progress.clone();

        let denylist = Denylist::standard().expect("standard denylist compiles");
        let worker = ChunkWorker::new(
            Arc::new(Normalizer::new(denylist)),
            SinkWriter::new(sinks),
            store.clone(),
            config.clone(),
        );
        let (queue, queue_handle) = LocalChunkQueue::start(worker, 8, 4);
        let coordinator = Arc::new(IngestionCoordinator::new(store, Arc::new(queue), config));

        Self {
            coordinator,
            progress,
            queue_handle,
        }
    }

    /// Drop the last queue handle and wait for every accepted chunk
    pub async fn drain(self) -> Arc<MemoryProgressStore> {
        let Self {
            coordinator,
            progress,
            queue_handle,
        } = self;
        drop(coordinator);
        tokio::time::timeout(Duration::from_secs(10), queue_handle)
            .await
            .expect("chunk workers finished in time")
            .expect("dispatcher did not panic");
        progress
    }

    pub async fn snapshot(&self, job_id: &str) -> JobSnapshot {
        self.progress
            .snapshot(job_id)
            .await
            .expect("memory store never fails")
            .expect("job is known")
    }
}

pub fn batch_config(chunk_size: usize, store_batch_size: usize) -> BatchConfig {
    BatchConfig {
        chunk_size,
        store_batch_size,
        dispatch_concurrency: 2,
        sink_errors_fatal: false,
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// An available listing with a positive price
pub fn listing(sku: u32, price: &str) -> Value {
    json!({
        "availability": true,
        "price": price,
        "sku": sku.to_string(),
        "model": format!("Model {sku}"),
        "brand": "Acme",
        "categoryId": "7",
        "country": "Germany DE",
        "url": format!("https://SHOP.example/p/{sku}"),
        "ismarketplace": false,
        "site": "Acme Store UK"
    })
}

pub fn to_bytes(records: &[Value]) -> Vec<u8> {
    serde_json::to_vec(records).expect("fixtures serialize")
}

pub async fn wait_for_status(progress: &MemoryProgressStore, job_id: &str, status: JobStatus) {
    for _ in 0..200 {
        if let Ok(Some(snapshot)) = progress.snapshot(job_id).await {
            if snapshot.status == Some(status) {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} never reached {status}");
}

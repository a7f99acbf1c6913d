//! Task queue between the coordinator and chunk workers
//!
//! Dispatch is one-way: once a [`ChunkTask`] is accepted by [`ChunkQueue::enqueue`]
//! the coordinator is done with it. Outcomes are only observable through the
//! progress store.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info};

use super::types::ChunkTask;
use super::worker::ChunkWorker;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Chunk queue is closed")]
    Closed,
}

#[async_trait]
pub trait ChunkQueue: Send + Sync {
    /// Hand a chunk over for processing. Waits while the queue is full.
    async fn enqueue(&self, task: ChunkTask) -> Result<(), QueueError>;
}

/// In-process queue: a bounded channel drained by a dispatcher that runs at
/// most `worker_concurrency` [`ChunkWorker`]s at a time
#[derive(Clone)]
pub struct LocalChunkQueue {
    sender: mpsc::Sender<ChunkTask>,
}

impl LocalChunkQueue {
    /// Spawn the dispatcher on the current runtime.
    ///
    /// The returned handle finishes once every queue handle is dropped and
    /// all accepted chunks have been processed.
    pub fn start(
        worker: ChunkWorker,
        capacity: usize,
        worker_concurrency: usize,
    ) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(dispatch_loop(
            worker,
            receiver,
            Arc::new(Semaphore::new(worker_concurrency.max(1))),
        ));
        (Self { sender }, handle)
    }
}

#[async_trait]
impl ChunkQueue for LocalChunkQueue {
    async fn enqueue(&self, task: ChunkTask) -> Result<(), QueueError> {
        self.sender.send(task).await.map_err(|_| QueueError::Closed)
    }
}

async fn dispatch_loop(
    worker: ChunkWorker,
    mut receiver: mpsc::Receiver<ChunkTask>,
    permits: Arc<Semaphore>,
) {
    let mut running = JoinSet::new();

    while let Some(task) = receiver.recv().await {
        let Ok(permit) = permits.clone().acquire_owned().await else {
            break;
        };
        debug!(job_id = %task.job_id, chunk_index = task.chunk_index, "Starting chunk worker");

        let worker = worker.clone();
        running.spawn(async move {
            let _permit = permit;
            // Failures are logged and recorded on the job by the worker
            let _ = worker.process(task).await;
        });

        while let Some(result) = running.try_join_next() {
            log_join(result);
        }
    }

    while let Some(result) = running.join_next().await {
        log_join(result);
    }
    info!("Chunk queue closed, all workers finished");
}

fn log_join(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        error!(error = %e, "Chunk worker task panicked");
    }
}

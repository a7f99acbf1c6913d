//! In-process progress store
//!
//! Same key layout as the Redis store, kept in a mutex-guarded map. Only
//! usable when the uploader, coordinator and workers share one process.

use async_trait::async_trait;
use listings_common::types::{JobField, JobSnapshot, JobStatus};
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::ingest::framework::progress::{
    parse_count, snapshot_from_raw, KeySpace, ProgressResult, ProgressStore,
};

#[derive(Default)]
pub struct MemoryProgressStore {
    keys: KeySpace,
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryProgressStore {
    pub fn new(keys: KeySpace) -> Self {
        Self {
            keys,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Raw value stored under a full key
    pub async fn get_raw(&self, key: &str) -> Option<String> {
        self.entries.lock().await.get(key).cloned()
    }
}

#[async_trait]
impl ProgressStore for MemoryProgressStore {
    async fn register(&self, job_id: &str, file_name: &str) -> ProgressResult<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(
            self.keys.key(job_id, JobField::Status),
            JobStatus::Pending.as_str().to_string(),
        );
        entries.insert(self.keys.key(job_id, JobField::FileName), file_name.to_string());
        Ok(())
    }

    async fn set_initial(&self, job_id: &str, total_chunks: u64) -> ProgressResult<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(
            self.keys.key(job_id, JobField::TotalChunks),
            total_chunks.to_string(),
        );
        entries.insert(self.keys.key(job_id, JobField::ProcessedChunks), "0".to_string());
        entries.insert(
            self.keys.key(job_id, JobField::Status),
            JobStatus::Processing.as_str().to_string(),
        );
        Ok(())
    }

    async fn increment_processed(&self, job_id: &str) -> ProgressResult<u64> {
        let key = self.keys.key(job_id, JobField::ProcessedChunks);
        let mut entries = self.entries.lock().await;
        let next = parse_count(&key, entries.get(&key).cloned())? + 1;
        entries.insert(key, next.to_string());
        Ok(next)
    }

    async fn set_status(&self, job_id: &str, status: JobStatus) -> ProgressResult<()> {
        self.entries.lock().await.insert(
            self.keys.key(job_id, JobField::Status),
            status.as_str().to_string(),
        );
        Ok(())
    }

    async fn transition_status(
        &self,
        job_id: &str,
        from: JobStatus,
        to: JobStatus,
    ) -> ProgressResult<bool> {
        if !from.can_transition_to(to) {
            return Ok(false);
        }
        let key = self.keys.key(job_id, JobField::Status);
        let mut entries = self.entries.lock().await;
        if entries.get(&key).map(String::as_str) != Some(from.as_str()) {
            return Ok(false);
        }
        entries.insert(key, to.as_str().to_string());
        Ok(true)
    }

    async fn snapshot(&self, job_id: &str) -> ProgressResult<Option<JobSnapshot>> {
        let entries = self.entries.lock().await;
        let get = |field| entries.get(&self.keys.key(job_id, field)).cloned();

        snapshot_from_raw(
            &self.keys,
            job_id,
            get(JobField::Status),
            get(JobField::TotalChunks),
            get(JobField::ProcessedChunks),
            get(JobField::FileName),
        )
    }
}

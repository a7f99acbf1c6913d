//! Redis-backed progress store
//!
//! One string key per job field. Counters use `INCR`, snapshots a single
//! `MGET`, and status transitions a small Lua compare-and-set script so the
//! check and the write happen in one round trip.

use ::redis::{aio::ConnectionManager, AsyncCommands, Client, Script};
use async_trait::async_trait;
use listings_common::types::{JobField, JobSnapshot, JobStatus};
use tracing::{debug, info};

use crate::ingest::framework::progress::{
    snapshot_from_raw, KeySpace, ProgressResult, ProgressStore,
};

const TRANSITION_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    redis.call('SET', KEYS[1], ARGV[2])
    return 1
end
return 0
"#;

/// Progress store shared by every process that talks to the same Redis
#[derive(Clone)]
pub struct RedisProgressStore {
    conn: ConnectionManager,
    keys: KeySpace,
    transition: Script,
}

impl RedisProgressStore {
    /// Connect to `url`; the manager reconnects on its own after failures
    pub async fn connect(url: &str, key_prefix: &str) -> ProgressResult<Self> {
        info!(key_prefix, "Connecting progress store to Redis");
        let client = Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self::new(conn, KeySpace::new(key_prefix)))
    }

    pub fn new(conn: ConnectionManager, keys: KeySpace) -> Self {
        Self {
            conn,
            keys,
            transition: Script::new(TRANSITION_SCRIPT),
        }
    }
}

#[async_trait]
impl ProgressStore for RedisProgressStore {
    async fn register(&self, job_id: &str, file_name: &str) -> ProgressResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .mset(&[
                (
                    self.keys.key(job_id, JobField::Status),
                    JobStatus::Pending.as_str(),
                ),
                (self.keys.key(job_id, JobField::FileName), file_name),
            ])
            .await?;
        Ok(())
    }

    async fn set_initial(&self, job_id: &str, total_chunks: u64) -> ProgressResult<()> {
        let mut conn = self.conn.clone();
        let total = total_chunks.to_string();
        let _: () = conn
            .mset(&[
                (self.keys.key(job_id, JobField::TotalChunks), total.as_str()),
                (self.keys.key(job_id, JobField::ProcessedChunks), "0"),
                (
                    self.keys.key(job_id, JobField::Status),
                    JobStatus::Processing.as_str(),
                ),
            ])
            .await?;
        Ok(())
    }

    async fn increment_processed(&self, job_id: &str) -> ProgressResult<u64> {
        let mut conn = self.conn.clone();
        let processed: u64 = conn
            .incr(self.keys.key(job_id, JobField::ProcessedChunks), 1u64)
            .await?;
        Ok(processed)
    }

    async fn set_status(&self, job_id: &str, status: JobStatus) -> ProgressResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set(self.keys.key(job_id, JobField::Status), status.as_str())
            .await?;
        Ok(())
    }

    async fn transition_status(
        &self,
        job_id: &str,
        from: JobStatus,
        to: JobStatus,
    ) -> ProgressResult<bool> {
        if !from.can_transition_to(to) {
            debug!(job_id, from = %from, to = %to, "Refused illegal status transition");
            return Ok(false);
        }
        let mut conn = self.conn.clone();
        let changed: i64 = self
            .transition
            .key(self.keys.key(job_id, JobField::Status))
            .arg(from.as_str())
            .arg(to.as_str())
            .invoke_async(&mut conn)
            .await?;
        debug!(job_id, from = %from, to = %to, changed = changed == 1, "Status transition");
        Ok(changed == 1)
    }

    async fn snapshot(&self, job_id: &str) -> ProgressResult<Option<JobSnapshot>> {
        let mut conn = self.conn.clone();
        let keys = [
            self.keys.key(job_id, JobField::Status),
            self.keys.key(job_id, JobField::TotalChunks),
            self.keys.key(job_id, JobField::ProcessedChunks),
            self.keys.key(job_id, JobField::FileName),
        ];
        let values: Vec<Option<String>> = conn.mget(&keys[..]).await?;
        let mut values = values.into_iter();

        snapshot_from_raw(
            &self.keys,
            job_id,
            values.next().flatten(),
            values.next().flatten(),
            values.next().flatten(),
            values.next().flatten(),
        )
    }

    async fn ping(&self) -> ProgressResult<()> {
        let mut conn = self.conn.clone();
        let _: String = ::redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

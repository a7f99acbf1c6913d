use listings_common::types::JobStatusReport;
use mediator::Request;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::ingest::framework::{ProgressError, ProgressStore};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetProcessingStatusQuery {
    pub job_id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum GetProcessingStatusError {
    #[error("Job ID is required and cannot be empty")]
    JobIdRequired,
    #[error("No processing job found for '{0}'")]
    NotFound(String),
    #[error("Progress store error: {0}")]
    Progress(#[from] ProgressError),
}

impl Request<Result<JobStatusReport, GetProcessingStatusError>> for GetProcessingStatusQuery {}

impl GetProcessingStatusQuery {
    pub fn validate(&self) -> Result<(), GetProcessingStatusError> {
        if self.job_id.trim().is_empty() {
            return Err(GetProcessingStatusError::JobIdRequired);
        }
        Ok(())
    }
}

/// Read-only view of a job's progress
#[tracing::instrument(skip(progress))]
pub async fn handle(
    progress: Arc<dyn ProgressStore>,
    query: GetProcessingStatusQuery,
) -> Result<JobStatusReport, GetProcessingStatusError> {
    query.validate()?;

    let snapshot = progress
        .snapshot(&query.job_id)
        .await?
        .ok_or_else(|| GetProcessingStatusError::NotFound(query.job_id.clone()))?;

    Ok(JobStatusReport::from(snapshot))
}

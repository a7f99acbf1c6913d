use mediator::Request;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use crate::ingest::framework::{IngestionCoordinator, ProgressError};

/// Acknowledgement message returned once a job has been handed off
pub const STARTED_MESSAGE: &str = "Started the processing";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadProductsCommand {
    pub file_name: String,
    #[serde(skip)]
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadProductsResponse {
    pub status: String,
    pub job_id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum UploadProductsError {
    #[error("A file is required in the 'file' field")]
    FileRequired,
    #[error("Filename is required and cannot be empty")]
    FilenameRequired,
    #[error("Filename must not exceed 255 characters")]
    FilenameLength,
    #[error("Content is required and cannot be empty")]
    ContentRequired,
    #[error("Failed to store upload: {0}")]
    Io(#[from] std::io::Error),
    #[error("Progress store error: {0}")]
    Progress(#[from] ProgressError),
}

impl Request<Result<UploadProductsResponse, UploadProductsError>> for UploadProductsCommand {}

impl UploadProductsCommand {
    pub fn validate(&self) -> Result<(), UploadProductsError> {
        if self.stored_name().is_none() {
            return Err(UploadProductsError::FilenameRequired);
        }
        if self.file_name.len() > 255 {
            return Err(UploadProductsError::FilenameLength);
        }
        if self.content.is_empty() {
            return Err(UploadProductsError::ContentRequired);
        }
        Ok(())
    }

    /// Client file name without any directory part
    fn stored_name(&self) -> Option<&str> {
        Path::new(self.file_name.trim())
            .file_name()
            .and_then(|name| name.to_str())
            .filter(|name| !name.is_empty())
    }
}

/// Store the upload, register the job as pending and start ingestion in the
/// background. Returns as soon as the job is registered.
#[tracing::instrument(skip(coordinator, upload_dir, command), fields(file_name = %command.file_name, size = command.content.len()))]
pub async fn handle(
    coordinator: Arc<IngestionCoordinator>,
    upload_dir: PathBuf,
    command: UploadProductsCommand,
) -> Result<UploadProductsResponse, UploadProductsError> {
    command.validate()?;
    let file_name = command
        .stored_name()
        .ok_or(UploadProductsError::FilenameRequired)?
        .to_string();

    let job_id = Uuid::new_v4().to_string();
    let path = upload_dir.join(format!("{job_id}-{file_name}"));

    tokio::fs::create_dir_all(&upload_dir).await?;
    tokio::fs::write(&path, &command.content).await?;

    coordinator.progress().register(&job_id, &file_name).await?;
    coordinator.spawn_job(path, job_id.clone());

    Ok(UploadProductsResponse {
        status: STARTED_MESSAGE.to_string(),
        job_id,
    })
}

//! Error types shared across the listings workspace

use thiserror::Error;

/// Result type alias for listings operations
pub type Result<T> = std::result::Result<T, ListingsError>;

/// Main error type for the shared listings vocabulary
#[derive(Error, Debug)]
pub enum ListingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid job status: {0}")]
    InvalidJobStatus(String),
}

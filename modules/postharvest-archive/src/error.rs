use postharvest_common::HarvestError;

/// Result type alias for archive operations.
pub type Result<T> = std::result::Result<T, ArchiveError>;

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("Storage write failed: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Writer stopped before the write committed")]
    WriterGone,

    #[error("No record at index {0}")]
    NotFound(usize),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<ArchiveError> for HarvestError {
    fn from(e: ArchiveError) -> Self {
        match e {
            ArchiveError::Other(inner) => HarvestError::Anyhow(inner),
            other => HarvestError::Storage(other.to_string()),
        }
    }
}

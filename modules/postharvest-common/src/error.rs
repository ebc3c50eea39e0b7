use thiserror::Error;

/// Failure taxonomy shared across the harvest pipeline.
///
/// Extraction-field failures and rejections are not errors: extractors return
/// empty values and rejected containers are logged and skipped.
#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

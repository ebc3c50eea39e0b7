//! Transfer seam: one awaitable result per (source URL, destination path).

use async_trait::async_trait;
use download_client::DownloadClient;

/// A transfer that was interrupted or never started.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct TransferError {
    pub reason: String,
}

impl TransferError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
pub trait AssetTransfer: Send + Sync {
    /// Fetch `url` into `destination` (relative to the transfer's root) and
    /// return the path the file was written to.
    async fn fetch(&self, url: &str, destination: &str) -> Result<String, TransferError>;
}

#[async_trait]
impl AssetTransfer for DownloadClient {
    async fn fetch(&self, url: &str, destination: &str) -> Result<String, TransferError> {
        self.download(url, destination)
            .await
            .map(|_| self.root().join(destination).display().to_string())
            .map_err(|e| TransferError::new(e.to_string()))
    }
}

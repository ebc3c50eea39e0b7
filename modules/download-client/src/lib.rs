pub mod error;

pub use error::{DownloadError, Result};

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Streams remote assets into files under a download root.
pub struct DownloadClient {
    client: reqwest::Client,
    root: PathBuf,
}

impl DownloadClient {
    pub fn new(root: impl Into<PathBuf>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("postharvest/0.1")
            .build()?;

        Ok(Self {
            client,
            root: root.into(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Download `url` to `destination`, a path relative to the download root.
    /// Bytes land in a `.part` file first and are renamed on completion, so an
    /// interrupted transfer never leaves a truncated file at the destination.
    /// Returns the number of bytes written.
    pub async fn download(&self, url: &str, destination: &str) -> Result<u64> {
        let target = resolve_destination(&self.root, destination)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(DownloadError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let partial = target.with_extension(match target.extension() {
            Some(ext) => format!("{}.part", ext.to_string_lossy()),
            None => "part".to_string(),
        });

        let mut file = tokio::fs::File::create(&partial).await?;
        let mut written = 0u64;
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    drop(file);
                    let _ = tokio::fs::remove_file(&partial).await;
                    return Err(e.into());
                }
            };
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&partial, &target).await?;
        debug!(url, path = %target.display(), bytes = written, "download complete");
        Ok(written)
    }
}

/// Join a relative destination onto the root, refusing absolute paths and `..`.
fn resolve_destination(root: &Path, destination: &str) -> Result<PathBuf> {
    let rel = Path::new(destination);
    if destination.trim().is_empty() {
        return Err(DownloadError::InvalidDestination("empty path".into()));
    }
    for component in rel.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => {
                return Err(DownloadError::InvalidDestination(destination.to_string()));
            }
        }
    }
    Ok(root.join(rel))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_destination_joins_root() {
        let p = resolve_destination(Path::new("/data"), "00001-ana/00.jpg").unwrap();
        assert_eq!(p, PathBuf::from("/data/00001-ana/00.jpg"));
    }

    #[test]
    fn parent_traversal_is_rejected() {
        assert!(resolve_destination(Path::new("/data"), "../etc/passwd").is_err());
    }

    #[test]
    fn absolute_destination_is_rejected() {
        assert!(resolve_destination(Path::new("/data"), "/etc/passwd").is_err());
    }

    #[test]
    fn empty_destination_is_rejected() {
        assert!(resolve_destination(Path::new("/data"), "  ").is_err());
    }

    #[tokio::test]
    async fn unreachable_host_reports_network_error() {
        let dir = tempfile::tempdir().unwrap();
        let client = DownloadClient::new(dir.path(), Duration::from_secs(2)).unwrap();
        let err = client
            .download("http://127.0.0.1:9/nothing.jpg", "a/00.jpg")
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::Network(_)));
        assert!(!dir.path().join("a/00.jpg").exists());
    }
}

//! Persistent asset queue. Items are unique by URL and move
//! pending → downloading → {done | failed}; failed → pending only by retry-all.

use std::collections::HashSet;
use std::sync::Arc;

use postharvest_common::{keys, DownloadProgress, QueueItem, QueueStatus};
use tracing::info;

use crate::error::Result;
use crate::kv::KvStore;
use crate::serial::{Change, SerialWriter};

#[derive(Clone)]
pub struct AssetQueue {
    writer: Arc<SerialWriter<Vec<QueueItem>>>,
}

impl AssetQueue {
    /// Load the queue and reset anything left `downloading` by a previous
    /// process to `pending`.
    pub async fn open(kv: Arc<dyn KvStore>) -> Result<Self> {
        let queue = Self {
            writer: SerialWriter::open(kv, keys::ASSET_QUEUE).await?,
        };
        let recovered = queue.recover_interrupted().await?;
        if recovered > 0 {
            info!(recovered, "Reset interrupted downloads to pending");
        }
        Ok(queue)
    }

    pub fn items(&self) -> Vec<QueueItem> {
        self.writer.snapshot()
    }

    pub fn progress(&self) -> DownloadProgress {
        self.writer.read(|items| DownloadProgress::from_items(items))
    }

    pub fn has_pending(&self) -> bool {
        self.writer
            .read(|items| items.iter().any(|i| i.status == QueueStatus::Pending))
    }

    /// Add items whose URL is not already queued, in any status. Returns how
    /// many were added.
    pub async fn enqueue(&self, new_items: Vec<QueueItem>) -> Result<usize> {
        self.writer
            .submit(move |items: &mut Vec<QueueItem>| {
                let mut known: HashSet<String> = items.iter().map(|i| i.url.clone()).collect();
                let before = items.len();
                for item in new_items {
                    if known.insert(item.url.clone()) {
                        items.push(item);
                    }
                }
                let added = items.len() - before;
                Ok(if added > 0 {
                    Change::Changed(added)
                } else {
                    Change::Unchanged(0)
                })
            })
            .await
    }

    /// Move every `downloading` item back to `pending`. Only safe when no
    /// transfer is in flight: at startup, or when the worker is idle.
    pub async fn recover_interrupted(&self) -> Result<usize> {
        self.writer
            .submit(|items: &mut Vec<QueueItem>| {
                let mut reset = 0;
                for item in items.iter_mut().filter(|i| i.status == QueueStatus::Downloading) {
                    item.status = QueueStatus::Pending;
                    reset += 1;
                }
                Ok(if reset > 0 {
                    Change::Changed(reset)
                } else {
                    Change::Unchanged(0)
                })
            })
            .await
    }

    /// Claim the first pending item, persisting the `downloading` transition.
    pub async fn claim_next(&self) -> Result<Option<QueueItem>> {
        self.writer
            .submit(|items: &mut Vec<QueueItem>| {
                match items.iter_mut().find(|i| i.status == QueueStatus::Pending) {
                    Some(item) => {
                        item.status = QueueStatus::Downloading;
                        item.error = None;
                        Ok(Change::Changed(Some(item.clone())))
                    }
                    None => Ok(Change::Unchanged(None)),
                }
            })
            .await
    }

    /// Persist the terminal outcome of a claimed item. Returns false when the
    /// item is gone (the queue was cleared mid-transfer).
    pub async fn finish(&self, url: &str, outcome: std::result::Result<(), String>) -> Result<bool> {
        let url = url.to_string();
        self.writer
            .submit(move |items: &mut Vec<QueueItem>| {
                let Some(item) = items
                    .iter_mut()
                    .find(|i| i.url == url && i.status == QueueStatus::Downloading)
                else {
                    return Ok(Change::Unchanged(false));
                };
                match outcome {
                    Ok(()) => {
                        item.status = QueueStatus::Done;
                        item.error = None;
                    }
                    Err(reason) => {
                        item.status = QueueStatus::Failed;
                        item.error = Some(reason);
                    }
                }
                Ok(Change::Changed(true))
            })
            .await
    }

    /// Reset every failed item to pending and clear its error.
    pub async fn retry_all(&self) -> Result<usize> {
        self.writer
            .submit(|items: &mut Vec<QueueItem>| {
                let mut reset = 0;
                for item in items.iter_mut().filter(|i| i.status == QueueStatus::Failed) {
                    item.status = QueueStatus::Pending;
                    item.error = None;
                    reset += 1;
                }
                Ok(if reset > 0 {
                    Change::Changed(reset)
                } else {
                    Change::Unchanged(0)
                })
            })
            .await
    }

    pub async fn clear(&self) -> Result<()> {
        self.writer
            .submit(|items: &mut Vec<QueueItem>| {
                if items.is_empty() {
                    return Ok(Change::Unchanged(()));
                }
                items.clear();
                Ok(Change::Changed(()))
            })
            .await
    }
}

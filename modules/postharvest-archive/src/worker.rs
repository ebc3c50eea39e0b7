//! Single-consumer queue worker.
//!
//! The busy flag admits one drain at a time. Pause is cooperative and checked
//! before each claim, so a transfer already in flight always finishes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::queue::AssetQueue;
use crate::records::RecordStore;
use crate::transfer::AssetTransfer;

/// Counts from one drain.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub done: usize,
    pub failed: usize,
}

pub struct QueueWorker {
    queue: AssetQueue,
    records: RecordStore,
    transfer: Arc<dyn AssetTransfer>,
    busy: AtomicBool,
    paused: AtomicBool,
}

impl QueueWorker {
    pub fn new(queue: AssetQueue, records: RecordStore, transfer: Arc<dyn AssetTransfer>) -> Arc<Self> {
        Arc::new(Self {
            queue,
            records,
            transfer,
            busy: AtomicBool::new(false),
            paused: AtomicBool::new(false),
        })
    }

    pub fn queue(&self) -> &AssetQueue {
        &self.queue
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Stop starting new transfers. The one in flight, if any, completes.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
        info!("Downloads paused");
    }

    pub fn resume(self: &Arc<Self>) {
        self.paused.store(false, Ordering::SeqCst);
        info!("Downloads resumed");
        self.kick();
    }

    /// Reset failed items to pending and start draining them.
    pub async fn retry_failed(self: &Arc<Self>) -> crate::error::Result<usize> {
        let reset = self.queue.retry_all().await?;
        info!(reset, "Retrying failed downloads");
        self.kick();
        Ok(reset)
    }

    /// Start a background drain unless one is running or the worker is paused.
    pub fn kick(self: &Arc<Self>) -> Option<JoinHandle<DrainReport>> {
        if self.is_busy() || self.is_paused() {
            return None;
        }
        let worker = Arc::clone(self);
        Some(tokio::spawn(async move { worker.drain().await }))
    }

    /// Process pending items one at a time until none remain or the worker is
    /// paused. Returns immediately when another drain holds the busy flag.
    pub async fn drain(&self) -> DrainReport {
        let mut report = DrainReport::default();
        loop {
            if self
                .busy
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                debug!("Worker already draining");
                return report;
            }
            let emptied = {
                let _busy = BusyGuard(&self.busy);
                self.drain_pending(&mut report).await
            };
            // An item enqueued after the last claim but before the flag
            // cleared saw a busy worker and was not kicked.
            if !emptied || self.is_paused() || !self.queue.has_pending() {
                return report;
            }
        }
    }

    /// Returns true when the queue ran out of pending items.
    async fn drain_pending(&self, report: &mut DrainReport) -> bool {
        // Nothing is in flight here, so a `downloading` item is one whose
        // terminal outcome failed to persist.
        if let Err(e) = self.queue.recover_interrupted().await {
            warn!(error = %e, "Could not reset interrupted downloads");
            return false;
        }

        loop {
            if self.is_paused() {
                debug!("Worker paused, stopping drain");
                return false;
            }

            let item = match self.queue.claim_next().await {
                Ok(Some(item)) => item,
                Ok(None) => return true,
                Err(e) => {
                    warn!(error = %e, "Failed to claim next download");
                    return false;
                }
            };

            match self.transfer.fetch(&item.url, &item.destination_path).await {
                Ok(path) => {
                    match self.queue.finish(&item.url, Ok(())).await {
                        Ok(true) => report.done += 1,
                        Ok(false) => {
                            debug!(url = %item.url, "Download finished after its item was cleared");
                            continue;
                        }
                        Err(e) => {
                            warn!(url = %item.url, error = %e, "Failed to persist completed download");
                            return false;
                        }
                    }
                    if let Err(e) = self
                        .records
                        .attach_local_file(item.source_record_index, item.asset_index, path.clone())
                        .await
                    {
                        warn!(url = %item.url, error = %e, "Failed to attach local file to record");
                    }
                    info!(url = %item.url, path = %path, "Download complete");
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(url = %item.url, error = %e, "Download failed");
                    if let Err(e) = self.queue.finish(&item.url, Err(e.reason)).await {
                        warn!(url = %item.url, error = %e, "Failed to persist failed download");
                        return false;
                    }
                }
            }
        }
    }
}

/// Clears the busy flag on every exit path.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

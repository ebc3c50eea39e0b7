//! The persisted side of a harvest session, opened together.

use std::sync::Arc;

use tracing::info;

use crate::dedup::DedupIndex;
use crate::error::Result;
use crate::kv::KvStore;
use crate::names::NameStore;
use crate::queue::AssetQueue;
use crate::records::RecordStore;

#[derive(Clone)]
pub struct Archive {
    pub records: RecordStore,
    pub queue: AssetQueue,
    pub dedup: Arc<DedupIndex>,
    pub names: NameStore,
}

impl Archive {
    /// Load records and queue, recover interrupted downloads, and rebuild the
    /// dedup index from what is stored.
    pub async fn open(kv: Arc<dyn KvStore>) -> Result<Self> {
        let records = RecordStore::open(kv.clone()).await?;
        let queue = AssetQueue::open(kv.clone()).await?;
        let stored = records.records();
        let dedup = Arc::new(DedupIndex::hydrate(&stored));
        info!(
            records = stored.len(),
            queued = queue.progress().total,
            "Archive opened"
        );
        Ok(Self {
            records,
            queue,
            dedup,
            names: NameStore::new(kv),
        })
    }

    /// Remove all records and queue items and forget every fingerprint.
    pub async fn clear_all(&self) -> Result<()> {
        // An in-flight download must find its item gone before a new record
        // can take over its index.
        self.queue.clear().await?;
        self.records.clear().await?;
        self.dedup.clear();
        info!("Archive cleared");
        Ok(())
    }
}

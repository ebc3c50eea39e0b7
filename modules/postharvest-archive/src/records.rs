//! Record store: one ordered sequence, append or replace-by-permalink,
//! written through the serialized writer.

use std::sync::Arc;

use postharvest_common::{keys, Record, StoreOutcome};
use tracing::debug;

use crate::error::{ArchiveError, Result};
use crate::kv::KvStore;
use crate::serial::{Change, SerialWriter};

#[derive(Clone)]
pub struct RecordStore {
    writer: Arc<SerialWriter<Vec<Record>>>,
}

impl RecordStore {
    pub async fn open(kv: Arc<dyn KvStore>) -> Result<Self> {
        let writer = SerialWriter::open(kv, keys::RECORDS).await?;
        Ok(Self { writer })
    }

    pub fn records(&self) -> Vec<Record> {
        self.writer.snapshot()
    }

    pub fn len(&self) -> usize {
        self.writer.read(Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<Record> {
        self.writer.read(|records| records.get(index).cloned())
    }

    /// Store a record. A record whose permalink is already stored replaces that
    /// slot in place, keeping downloaded files for unchanged assets; anything
    /// else is appended. The position is computed inside the writer, so
    /// concurrent submissions never race for the same slot.
    pub async fn submit(&self, record: Record) -> Result<StoreOutcome> {
        if record.is_empty() {
            return Err(ArchiveError::Other(anyhow::anyhow!(
                "refusing to store a record with neither author nor text"
            )));
        }

        self.writer
            .submit(move |records: &mut Vec<Record>| {
                let existing = record.permalink.as_ref().and_then(|permalink| {
                    records
                        .iter()
                        .position(|r| r.permalink.as_ref() == Some(permalink))
                });

                let outcome = match existing {
                    Some(index) => {
                        let mut replacement = record;
                        replacement.inherit_local_files(&records[index]);
                        records[index] = replacement;
                        StoreOutcome::Replaced { index }
                    }
                    None => {
                        records.push(record);
                        StoreOutcome::Appended {
                            index: records.len() - 1,
                        }
                    }
                };
                Ok(Change::Changed(outcome))
            })
            .await
    }

    /// Record a finished download in the owning record's `localFiles` slot.
    pub async fn attach_local_file(
        &self,
        record_index: usize,
        asset_index: usize,
        path: String,
    ) -> Result<()> {
        self.writer
            .submit(move |records: &mut Vec<Record>| {
                let record = records
                    .get_mut(record_index)
                    .ok_or(ArchiveError::NotFound(record_index))?;
                if record.local_files.get(asset_index).and_then(Option::as_ref) == Some(&path) {
                    return Ok(Change::Unchanged(()));
                }
                debug!(record_index, asset_index, path = %path, "Attaching local file");
                record.set_local_file(asset_index, path);
                Ok(Change::Changed(()))
            })
            .await
    }

    /// Remove every record.
    pub async fn clear(&self) -> Result<()> {
        self.writer
            .submit(|records: &mut Vec<Record>| {
                if records.is_empty() {
                    return Ok(Change::Unchanged(()));
                }
                records.clear();
                Ok(Change::Changed(()))
            })
            .await
    }
}

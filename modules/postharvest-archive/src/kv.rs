//! Durable key-value persistence seam and its in-process implementations.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;

/// Named JSON values. The whole persisted state is a handful of keys, each
/// read once at startup and rewritten whole by a single writer.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;
    async fn set(&self, key: &str, value: Value) -> Result<()>;
}

#[async_trait]
impl<K: KvStore + ?Sized> KvStore for Arc<K> {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        (**self).set(key, value).await
    }
}

// ---------------------------------------------------------------------------
// MemoryKvStore (tests and ephemeral sessions)
// ---------------------------------------------------------------------------

/// In-memory store with write-failure injection and optional write latency.
#[derive(Default)]
pub struct MemoryKvStore {
    values: Mutex<HashMap<String, Value>>,
    writes: AtomicUsize,
    fail_next: AtomicUsize,
    fail_all: AtomicBool,
    latency: Mutex<Option<Duration>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every write sleeps this long before committing, so concurrent
    /// submissions get a chance to interleave.
    pub fn with_latency(self, latency: Duration) -> Self {
        *self.latency.lock().unwrap() = Some(latency);
        self
    }

    /// Fail the next `n` writes.
    pub fn fail_next_writes(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Fail every write until switched off.
    pub fn set_failing(&self, failing: bool) {
        self.fail_all.store(failing, Ordering::SeqCst);
    }

    /// Number of committed writes.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Current value of a key (for test assertions).
    pub fn value(&self, key: &str) -> Option<Value> {
        self.values.lock().unwrap().get(key).cloned()
    }

    pub fn insert(&self, key: &str, value: Value) {
        self.values.lock().unwrap().insert(key.to_string(), value);
    }

    fn take_failure(&self) -> bool {
        if self.fail_all.load(Ordering::SeqCst) {
            return true;
        }
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.values.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let latency = *self.latency.lock().unwrap();
        match latency {
            Some(d) => tokio::time::sleep(d).await,
            None => tokio::task::yield_now().await,
        }
        if self.take_failure() {
            anyhow::bail!("injected write failure for {key}");
        }
        self.values.lock().unwrap().insert(key.to_string(), value);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FileKvStore (one JSON file per key)
// ---------------------------------------------------------------------------

/// Stores each key as `<dir>/<key>.json`. Writes go to a temp file in the same
/// directory and are renamed over the old file, so a crash mid-write leaves
/// the previous value intact.
pub struct FileKvStore {
    dir: PathBuf,
}

impl FileKvStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

#[async_trait]
impl KvStore for FileKvStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let value = serde_json::from_slice(&bytes)
                    .with_context(|| format!("corrupt value at {}", path.display()))?;
                Ok(Some(value))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
        }
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let dir = self.dir.clone();
        let path = self.path_for(key);
        tokio::task::spawn_blocking(move || -> Result<()> {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
            let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
            serde_json::to_writer_pretty(&mut tmp, &value)?;
            tmp.flush()?;
            tmp.as_file().sync_all()?;
            tmp.persist(&path)
                .with_context(|| format!("failed to replace {}", path.display()))?;
            Ok(())
        })
        .await
        .context("file write task panicked")?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn memory_store_injects_failures() {
        let kv = MemoryKvStore::new();
        kv.fail_next_writes(1);
        assert!(kv.set("a", json!(1)).await.is_err());
        kv.set("a", json!(2)).await.unwrap();
        assert_eq!(kv.get("a").await.unwrap(), Some(json!(2)));
        assert_eq!(kv.write_count(), 1);
    }

    #[tokio::test]
    async fn file_store_round_trips_and_reports_missing() {
        let dir = tempfile::tempdir().unwrap();
        let kv = FileKvStore::new(dir.path().join("state"));
        assert_eq!(kv.get("records").await.unwrap(), None);

        kv.set("records", json!([{"author": "Ana"}])).await.unwrap();
        kv.set("records", json!([{"author": "Bo"}])).await.unwrap();
        assert_eq!(kv.get("records").await.unwrap(), Some(json!([{"author": "Bo"}])));
    }

    #[tokio::test]
    async fn file_store_rejects_corrupt_values() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("records.json"), b"{not json").unwrap();
        let kv = FileKvStore::new(dir.path());
        assert!(kv.get("records").await.is_err());
    }
}

//! Serialized single-writer over one persisted value.
//!
//! Submissions are queued and drained one at a time by a single writer task.
//! Each mutation runs against a draft copy of the committed state; the draft
//! replaces the committed state only after the key-value write succeeds, and
//! the submitter hears back only then.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::warn;

use crate::error::{ArchiveError, Result};
use crate::kv::KvStore;

/// What a mutation did to the draft.
pub enum Change<R> {
    /// The draft changed and must be persisted before `R` is delivered.
    Changed(R),
    /// Nothing to persist.
    Unchanged(R),
}

struct Staged {
    changed: bool,
    finish: Box<dyn FnOnce(Result<()>) + Send>,
}

type Job<S> = Box<dyn FnOnce(&mut S) -> Staged + Send>;

struct WriterState<S> {
    committed: S,
    pending: VecDeque<Job<S>>,
    writing: bool,
}

pub struct SerialWriter<S> {
    key: &'static str,
    kv: Arc<dyn KvStore>,
    state: Mutex<WriterState<S>>,
}

impl<S> SerialWriter<S>
where
    S: Clone + Default + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Load the committed state for `key`, or start from the default.
    pub async fn open(kv: Arc<dyn KvStore>, key: &'static str) -> Result<Arc<Self>> {
        let committed = match kv.get(key).await.map_err(storage)? {
            Some(value) => serde_json::from_value(value)?,
            None => S::default(),
        };
        Ok(Arc::new(Self {
            key,
            kv,
            state: Mutex::new(WriterState {
                committed,
                pending: VecDeque::new(),
                writing: false,
            }),
        }))
    }

    /// Copy of the last committed state.
    pub fn snapshot(&self) -> S {
        self.lock().committed.clone()
    }

    /// Read the committed state without cloning it.
    pub fn read<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.lock().committed)
    }

    /// Queue a mutation and wait until it is durably committed.
    ///
    /// A mutation that returns an error or `Unchanged` leaves the committed
    /// state untouched. A failed write is returned to this caller only; the
    /// writer moves on to the next queued mutation.
    pub async fn submit<R, F>(self: &Arc<Self>, mutate: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut S) -> Result<Change<R>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel::<Result<R>>();
        let job: Job<S> = Box::new(move |draft: &mut S| match mutate(draft) {
            Ok(Change::Changed(value)) => Staged {
                changed: true,
                finish: Box::new(move |written| {
                    let _ = tx.send(written.map(|()| value));
                }),
            },
            Ok(Change::Unchanged(value)) => Staged {
                changed: false,
                finish: Box::new(move |_| {
                    let _ = tx.send(Ok(value));
                }),
            },
            Err(e) => Staged {
                changed: false,
                finish: Box::new(move |_| {
                    let _ = tx.send(Err(e));
                }),
            },
        });

        let start_writer = {
            let mut state = self.lock();
            state.pending.push_back(job);
            !std::mem::replace(&mut state.writing, true)
        };
        if start_writer {
            let writer = Arc::clone(self);
            tokio::spawn(async move { writer.drain().await });
        }

        rx.await.map_err(|_| ArchiveError::WriterGone)?
    }

    async fn drain(self: Arc<Self>) {
        let mut guard = WritingGuard {
            writer: &self,
            armed: true,
        };
        loop {
            let (job, mut draft) = {
                let mut state = self.lock();
                let Some(job) = state.pending.pop_front() else {
                    state.writing = false;
                    guard.armed = false;
                    return;
                };
                (job, state.committed.clone())
            };

            let staged = job(&mut draft);
            let written = if staged.changed {
                self.persist(&draft).await
            } else {
                Ok(())
            };
            if staged.changed && written.is_ok() {
                self.lock().committed = draft;
            }
            if let Err(e) = &written {
                warn!(key = self.key, error = %e, "Persist failed, write not committed");
            }
            (staged.finish)(written);
        }
    }

    async fn persist(&self, draft: &S) -> Result<()> {
        let value = serde_json::to_value(draft)?;
        self.kv.set(self.key, value).await.map_err(storage)
    }

    fn lock(&self) -> MutexGuard<'_, WriterState<S>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn storage(e: anyhow::Error) -> ArchiveError {
    ArchiveError::Storage(format!("{e:#}"))
}

/// Releases the writing flag if the writer task unwinds. Queued jobs are
/// dropped so their submitters see `WriterGone` instead of waiting forever.
struct WritingGuard<'a, S> {
    writer: &'a SerialWriter<S>,
    armed: bool,
}

impl<S> Drop for WritingGuard<'_, S> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.writer.state.lock().unwrap_or_else(|e| e.into_inner());
        state.writing = false;
        state.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKvStore;

    #[tokio::test]
    async fn committed_only_after_successful_write() {
        let kv = Arc::new(MemoryKvStore::new());
        let writer = SerialWriter::<Vec<u32>>::open(kv.clone(), "nums").await.unwrap();

        writer
            .submit(|s: &mut Vec<u32>| {
                s.push(1);
                Ok(Change::Changed(()))
            })
            .await
            .unwrap();

        kv.fail_next_writes(1);
        let failed = writer
            .submit(|s: &mut Vec<u32>| {
                s.push(2);
                Ok(Change::Changed(()))
            })
            .await;
        assert!(matches!(failed, Err(ArchiveError::Storage(_))));
        assert_eq!(writer.snapshot(), vec![1]);
        assert_eq!(kv.value("nums"), Some(serde_json::json!([1])));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn submits_from_spawned_tasks_all_commit() {
        let kv = Arc::new(MemoryKvStore::new().with_latency(std::time::Duration::from_millis(2)));
        let writer = SerialWriter::<Vec<u32>>::open(kv.clone(), "nums").await.unwrap();

        let handles: Vec<_> = (0..16u32)
            .map(|n| {
                let writer = writer.clone();
                tokio::spawn(async move {
                    writer
                        .submit(move |s: &mut Vec<u32>| {
                            s.push(n);
                            Ok(Change::Changed(()))
                        })
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let mut committed = writer.snapshot();
        committed.sort_unstable();
        assert_eq!(committed, (0..16).collect::<Vec<_>>());
        let persisted: Vec<u32> = serde_json::from_value(kv.value("nums").unwrap()).unwrap();
        assert_eq!(persisted.len(), 16);
    }

    #[tokio::test]
    async fn unchanged_skips_the_write() {
        let kv = Arc::new(MemoryKvStore::new());
        let writer = SerialWriter::<Vec<u32>>::open(kv.clone(), "nums").await.unwrap();
        let n = writer
            .submit(|s: &mut Vec<u32>| Ok(Change::Unchanged(s.len())))
            .await
            .unwrap();
        assert_eq!(n, 0);
        assert_eq!(kv.write_count(), 0);
    }

    #[tokio::test]
    async fn reopen_loads_committed_state() {
        let kv = Arc::new(MemoryKvStore::new());
        let writer = SerialWriter::<Vec<u32>>::open(kv.clone(), "nums").await.unwrap();
        writer
            .submit(|s: &mut Vec<u32>| {
                s.extend([7, 8]);
                Ok(Change::Changed(()))
            })
            .await
            .unwrap();

        let reopened = SerialWriter::<Vec<u32>>::open(kv, "nums").await.unwrap();
        assert_eq!(reopened.snapshot(), vec![7, 8]);
    }
}

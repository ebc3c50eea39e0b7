use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use postharvest_archive::{Admission, Archive, KvStore, MemoryKvStore, RecordStore};
use postharvest_common::{keys, Record, StoreOutcome};

fn record(author: &str, text: &str, permalink: Option<&str>) -> Record {
    Record {
        author: author.into(),
        text: text.into(),
        timestamp: "2h".into(),
        permalink: permalink.map(String::from),
        reactions_label: String::new(),
        comments_label: String::new(),
        images: Vec::new(),
        videos: Vec::new(),
        local_files: Vec::new(),
        captured_at: Utc::now(),
    }
}

/// Admit, store, and roll the admission back if the write fails.
async fn capture(archive: &Archive, record: Record) -> Option<StoreOutcome> {
    let ticket = match archive.dedup.admit(&record) {
        Admission::New(ticket) | Admission::Replace(ticket) => ticket,
        Admission::Duplicate | Admission::NotLonger { .. } => return None,
    };
    match archive.records.submit(record).await {
        Ok(outcome) => Some(outcome),
        Err(_) => {
            archive.dedup.rollback(ticket);
            None
        }
    }
}

#[tokio::test]
async fn stored_length_follows_strict_improvements_only() {
    let archive = Archive::open(Arc::new(MemoryKvStore::new())).await.unwrap();
    let permalink = Some("https://www.facebook.com/a/posts/1");
    let texts = ["Short", "Short, then", "Short, then longer", "Short, then", "Short, then longer"];

    let mut observed = Vec::new();
    for text in texts {
        capture(&archive, record("Ana", text, permalink)).await;
        let stored = archive.records.get(0).unwrap();
        if observed.last() != Some(&stored.text_len()) {
            observed.push(stored.text_len());
        }
    }

    assert_eq!(observed, vec![5, 11, 18]);
    assert_eq!(archive.records.len(), 1);
    assert_eq!(archive.dedup.best_len(permalink.unwrap()), Some(18));
}

#[tokio::test]
async fn identical_content_is_stored_once() {
    let archive = Archive::open(Arc::new(MemoryKvStore::new())).await.unwrap();
    assert!(capture(&archive, record("Ana", "Great day!", None)).await.is_some());
    assert!(capture(&archive, record("Ana", "Great day!", None)).await.is_none());
    assert!(capture(&archive, record("Ana", "Great day!", Some("p9"))).await.is_none());
    assert_eq!(archive.records.len(), 1);
}

#[tokio::test]
async fn failed_write_is_retried_on_the_next_capture() {
    let kv = Arc::new(MemoryKvStore::new());
    let archive = Archive::open(kv.clone()).await.unwrap();

    kv.fail_next_writes(1);
    assert!(capture(&archive, record("Ana", "Lost once", Some("p1"))).await.is_none());
    assert!(archive.records.is_empty());
    assert_eq!(archive.dedup.best_len("p1"), None);

    let outcome = capture(&archive, record("Ana", "Lost once", Some("p1"))).await;
    assert_eq!(outcome, Some(StoreOutcome::Appended { index: 0 }));
}

#[tokio::test]
async fn dedup_index_survives_restart() {
    let kv: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
    {
        let archive = Archive::open(kv.clone()).await.unwrap();
        capture(&archive, record("Ana", "Before restart, longer", Some("p1"))).await;
    }

    let archive = Archive::open(kv).await.unwrap();
    assert!(capture(&archive, record("Ana", "Before restart, longer", Some("p1"))).await.is_none());
    assert!(capture(&archive, record("Ana", "Before restart", Some("p1"))).await.is_none());
    assert_eq!(archive.records.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_submissions_lose_nothing() {
    let kv = Arc::new(MemoryKvStore::new().with_latency(Duration::from_millis(2)));
    let store = RecordStore::open(kv.clone()).await.unwrap();

    let handles: Vec<_> = (0..20)
        .map(|i| {
            let store = store.clone();
            tokio::spawn(async move { store.submit(record("Ana", &format!("post {i}"), None)).await })
        })
        .collect();

    let mut indices = HashSet::new();
    for handle in futures::future::join_all(handles).await {
        let outcome = handle.unwrap().unwrap();
        assert!(matches!(outcome, StoreOutcome::Appended { .. }));
        indices.insert(outcome.index());
    }

    assert_eq!(indices, (0..20).collect::<HashSet<_>>());
    assert_eq!(store.len(), 20);
    let persisted = kv.value(keys::RECORDS).unwrap();
    assert_eq!(persisted.as_array().unwrap().len(), 20);
}

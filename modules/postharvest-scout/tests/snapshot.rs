use std::sync::Arc;
use std::time::Duration;

use postharvest_archive::{FileKvStore, MemoryKvStore};
use postharvest_scout::testing::RecordingTransfer;
use postharvest_scout::{export_records, HarvestSettings, Harvester, SessionEnd, SnapshotPage};

const FEED: &str = include_str!("fixtures/feed.html");

fn snapshot_settings() -> HarvestSettings {
    HarvestSettings::builder()
        .debounce(Duration::from_millis(50))
        .periodic_scan(Duration::from_millis(200))
        .expansion_settle(Duration::ZERO)
        .scroll_tick(Duration::from_millis(100))
        .max_stalls(3)
        .max_retries(0)
        .build()
}

#[tokio::test(start_paused = true)]
async fn snapshot_session_runs_to_completion() {
    let page = Arc::new(SnapshotPage::new(FEED));
    let kv = Arc::new(MemoryKvStore::new());
    let harvester = Harvester::open(page, kv, RecordingTransfer::new(), snapshot_settings())
        .await
        .unwrap();

    harvester.set_active(true);
    assert_eq!(harvester.wait().await, Some(SessionEnd::Complete));

    let records = harvester.records();
    assert_eq!(records.len(), 2);
    // Nothing expands in a snapshot: the truncated text is what gets stored.
    assert!(records[0].text.starts_with("Walked the river trail"));
    assert!(!records[0].text.to_lowercase().contains("see more"));
}

#[tokio::test]
async fn records_survive_reopen_from_files() {
    let dir = tempfile::tempdir().unwrap();
    {
        let page = Arc::new(SnapshotPage::new(FEED));
        let kv = Arc::new(FileKvStore::new(dir.path()));
        let harvester = Harvester::open(page, kv, RecordingTransfer::new(), snapshot_settings())
            .await
            .unwrap();
        harvester.set_active(true);
        assert_eq!(harvester.wait().await, Some(SessionEnd::Complete));
        assert_eq!(harvester.count(), 2);
    }

    // A fresh process over the same files stores nothing twice.
    let page = Arc::new(SnapshotPage::new(FEED));
    let kv = Arc::new(FileKvStore::new(dir.path()));
    let harvester = Harvester::open(page, kv, RecordingTransfer::new(), snapshot_settings())
        .await
        .unwrap();
    harvester.set_active(true);
    assert_eq!(harvester.wait().await, Some(SessionEnd::Complete));
    assert_eq!(harvester.count(), 2);
}

#[tokio::test]
async fn export_redacts_the_manual_name() {
    let page = Arc::new(SnapshotPage::new(
        r#"<html><body><div id="feed"><div id="p">
          <h3><a href="/ana">Ana Ruiz</a></h3>
          <span><a href="/ana/posts/9">1h</a></span>
          <div dir="auto">Thanks Sam K for the ride home last night!</div>
        </div></div></body></html>"#,
    ));
    let kv = Arc::new(MemoryKvStore::new());
    let harvester = Harvester::open(page, kv, RecordingTransfer::new(), snapshot_settings())
        .await
        .unwrap();
    harvester.set_active(true);
    harvester.wait().await;
    assert!(harvester.records()[0].text.contains("Sam K"));

    harvester.set_manual_name("Sam K").await.unwrap();
    let exported = harvester.export().await.unwrap();
    assert!(!exported[0].text.contains("Sam K"));
    assert!(exported[0].text.contains("for the ride home"));

    // Stored records are untouched.
    assert!(harvester.records()[0].text.contains("Sam K"));
    assert_eq!(export_records(harvester.records(), None), harvester.records());
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::hash::content_hash;

// --- Persisted layout ---

/// Key-value names of the persisted state. Opaque to callers of the core.
pub mod keys {
    pub const RECORDS: &str = "records";
    pub const ASSET_QUEUE: &str = "assetQueue";
    pub const VIEWER_NAME: &str = "viewerName";
    pub const MANUAL_OVERRIDE_NAME: &str = "manualOverrideName";
}

// --- Records ---

/// One captured post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub timestamp: String,
    /// Unique key when present; drives replace-with-longer-capture.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permalink: Option<String>,
    #[serde(default)]
    pub reactions_label: String,
    #[serde(default)]
    pub comments_label: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub videos: Vec<String>,
    /// Sparse, indexed by asset position. Filled in by the queue worker.
    #[serde(default)]
    pub local_files: Vec<Option<String>>,
    pub captured_at: DateTime<Utc>,
}

impl Record {
    /// A record with neither text nor author is never stored.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.author.trim().is_empty()
    }

    /// Text length in characters. This is the unit the dedup index compares.
    pub fn text_len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn fingerprint(&self) -> String {
        content_hash(&self.author, &self.text)
    }

    /// Attach a downloaded file to the asset slot, growing the sparse vector as needed.
    pub fn set_local_file(&mut self, asset_index: usize, path: impl Into<String>) {
        if self.local_files.len() <= asset_index {
            self.local_files.resize(asset_index + 1, None);
        }
        self.local_files[asset_index] = Some(path.into());
    }

    /// Carry over downloaded files from a previous capture of the same post,
    /// but only for slots whose image URL is unchanged.
    pub fn inherit_local_files(&mut self, previous: &Record) {
        for (i, path) in previous.local_files.iter().enumerate() {
            let Some(path) = path else { continue };
            let same_asset = match (self.asset_url(i), previous.asset_url(i)) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            };
            if same_asset {
                self.set_local_file(i, path.clone());
            }
        }
    }

    /// Asset URL at a combined position: images first, then videos.
    pub fn asset_url(&self, asset_index: usize) -> Option<&str> {
        if asset_index < self.images.len() {
            return self.images.get(asset_index).map(String::as_str);
        }
        self.videos
            .get(asset_index - self.images.len())
            .map(String::as_str)
    }
}

// --- Asset queue ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    Downloading,
    Done,
    Failed,
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueStatus::Pending => write!(f, "pending"),
            QueueStatus::Downloading => write!(f, "downloading"),
            QueueStatus::Done => write!(f, "done"),
            QueueStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    #[default]
    Image,
    Video,
}

/// One asset transfer job tied to a record and an asset position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub source_record_index: usize,
    pub asset_index: usize,
    #[serde(default)]
    pub kind: AssetKind,
    pub url: String,
    pub destination_path: String,
    pub status: QueueStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueueItem {
    pub fn pending(
        source_record_index: usize,
        asset_index: usize,
        kind: AssetKind,
        url: impl Into<String>,
        destination_path: impl Into<String>,
    ) -> Self {
        Self {
            source_record_index,
            asset_index,
            kind,
            url: url.into(),
            destination_path: destination_path.into(),
            status: QueueStatus::Pending,
            error: None,
        }
    }
}

/// Summary counts for the download progress query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadProgress {
    pub total: usize,
    pub done: usize,
    pub failed: usize,
    pub downloading: usize,
    pub pending: usize,
}

impl DownloadProgress {
    pub fn from_items(items: &[QueueItem]) -> Self {
        items.iter().fold(
            DownloadProgress {
                total: items.len(),
                ..Default::default()
            },
            |mut acc, item| {
                match item.status {
                    QueueStatus::Pending => acc.pending += 1,
                    QueueStatus::Downloading => acc.downloading += 1,
                    QueueStatus::Done => acc.done += 1,
                    QueueStatus::Failed => acc.failed += 1,
                }
                acc
            },
        )
    }
}

// --- Capture outcomes ---

/// Whether a stored record was appended or replaced a shorter capture in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreOutcome {
    Appended { index: usize },
    Replaced { index: usize },
}

impl StoreOutcome {
    pub fn index(&self) -> usize {
        match self {
            StoreOutcome::Appended { index } | StoreOutcome::Replaced { index } => *index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(images: &[&str], videos: &[&str]) -> Record {
        Record {
            author: "Ana".into(),
            text: "hello".into(),
            timestamp: String::new(),
            permalink: None,
            reactions_label: String::new(),
            comments_label: String::new(),
            images: images.iter().map(|s| s.to_string()).collect(),
            videos: videos.iter().map(|s| s.to_string()).collect(),
            local_files: Vec::new(),
            captured_at: Utc::now(),
        }
    }

    #[test]
    fn empty_record_has_no_text_and_no_author() {
        let mut r = record(&[], &[]);
        assert!(!r.is_empty());
        r.author = "  ".into();
        r.text = "\n".into();
        assert!(r.is_empty());
    }

    #[test]
    fn local_files_grow_sparsely() {
        let mut r = record(&["a", "b", "c"], &[]);
        r.set_local_file(2, "x/02.jpg");
        assert_eq!(r.local_files, vec![None, None, Some("x/02.jpg".to_string())]);
    }

    #[test]
    fn asset_url_spans_images_then_videos() {
        let r = record(&["img0", "img1"], &["vid0"]);
        assert_eq!(r.asset_url(1), Some("img1"));
        assert_eq!(r.asset_url(2), Some("vid0"));
        assert_eq!(r.asset_url(3), None);
    }

    #[test]
    fn inherit_keeps_only_unchanged_slots() {
        let mut old = record(&["a", "b"], &[]);
        old.set_local_file(0, "a.jpg");
        old.set_local_file(1, "b.jpg");

        let mut new = record(&["a", "z"], &[]);
        new.inherit_local_files(&old);
        assert_eq!(new.local_files, vec![Some("a.jpg".to_string())]);
    }

    #[test]
    fn progress_counts_every_status() {
        let mut items = vec![
            QueueItem::pending(0, 0, AssetKind::Image, "u1", "p1"),
            QueueItem::pending(0, 1, AssetKind::Image, "u2", "p2"),
            QueueItem::pending(1, 0, AssetKind::Video, "u3", "p3"),
            QueueItem::pending(1, 1, AssetKind::Image, "u4", "p4"),
        ];
        items[1].status = QueueStatus::Done;
        items[2].status = QueueStatus::Failed;
        items[3].status = QueueStatus::Downloading;

        let p = DownloadProgress::from_items(&items);
        assert_eq!(
            p,
            DownloadProgress {
                total: 4,
                done: 1,
                failed: 1,
                downloading: 1,
                pending: 1
            }
        );
    }

    #[test]
    fn record_serializes_with_camel_case_layout() {
        let r = record(&["a"], &[]);
        let json = serde_json::to_value(&r).unwrap();
        assert!(json.get("capturedAt").is_some());
        assert!(json.get("localFiles").is_some());
        assert!(json.get("permalink").is_none());
    }
}

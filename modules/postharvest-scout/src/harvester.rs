//! The control surface: one handle over a host page, its archive, the capture
//! pipeline and the download worker.

use std::sync::{Arc, Mutex};

use postharvest_archive::{Archive, AssetTransfer, KvStore, QueueWorker};
use postharvest_common::{DownloadProgress, Record};
use postharvest_extract::{detect_viewer_name, redact_viewer_name};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::capture::CaptureController;
use crate::events::HarvestEvent;
use crate::host::HostPage;
use crate::scan::Scanner;
use crate::session::{run_session, SessionControl, SessionEnd};
use crate::settings::HarvestSettings;

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HarvestStatus {
    pub active: bool,
    pub records: usize,
    pub downloads: DownloadProgress,
    pub downloads_paused: bool,
    pub viewer_name: Option<String>,
}

pub struct Harvester<H: HostPage> {
    host: Arc<H>,
    archive: Archive,
    worker: Arc<QueueWorker>,
    scanner: Arc<Scanner<H::Node>>,
    settings: HarvestSettings,
    control: Arc<SessionControl>,
    events: broadcast::Sender<HarvestEvent>,
    session: Mutex<Option<JoinHandle<SessionEnd>>>,
    /// Name found on this page, kept for the life of the handle.
    detected_name: Mutex<Option<String>>,
}

impl<H: HostPage> Harvester<H> {
    /// Open the archive on `kv` and wire the pipeline. Pending downloads left
    /// from a previous run start draining immediately.
    pub async fn open(
        host: Arc<H>,
        kv: Arc<dyn KvStore>,
        transfer: Arc<dyn AssetTransfer>,
        settings: HarvestSettings,
    ) -> anyhow::Result<Self> {
        let archive = Archive::open(kv).await?;
        let worker = QueueWorker::new(archive.queue.clone(), archive.records.clone(), transfer);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let capture = Arc::new(CaptureController::new(
            archive.clone(),
            worker.clone(),
            settings.clone(),
            events.clone(),
        ));
        capture.set_viewer_name(archive.names.effective_name().await?);

        if archive.queue.has_pending() {
            worker.kick();
        }

        Ok(Self {
            host,
            archive,
            worker,
            scanner: Arc::new(Scanner::new(capture)),
            settings,
            control: Arc::new(SessionControl::default()),
            events,
            session: Mutex::new(None),
            detected_name: Mutex::new(None),
        })
    }

    pub fn archive(&self) -> &Archive {
        &self.archive
    }

    pub fn worker(&self) -> &Arc<QueueWorker> {
        &self.worker
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HarvestEvent> {
        self.events.subscribe()
    }

    /// Start or stop the session. Starting keeps container marks and the dedup
    /// index; only the scroll counters begin fresh.
    pub fn set_active(&self, active: bool) {
        if !active {
            if self.control.is_active() {
                info!("Stopping harvest session");
            }
            self.control.stop();
            return;
        }
        if !self.control.start() {
            return;
        }

        let handle = tokio::spawn(run_session(
            self.host.clone(),
            self.scanner.clone(),
            self.settings.clone(),
            self.control.clone(),
            self.events.clone(),
        ));
        let previous = self
            .session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(handle);
        if let Some(previous) = previous {
            if !previous.is_finished() {
                // A stopped session that has not yet left its current
                // iteration; it exits on the next flag check.
                warn!("Previous session still winding down");
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.control.is_active()
    }

    /// Wait for the current session to end.
    pub async fn wait(&self) -> Option<SessionEnd> {
        let handle = self.session.lock().unwrap_or_else(|e| e.into_inner()).take()?;
        match handle.await {
            Ok(end) => Some(end),
            Err(e) => {
                warn!(error = %e, "Session task failed");
                None
            }
        }
    }

    pub async fn status(&self) -> HarvestStatus {
        let viewer_name = match self.archive.names.effective_name().await {
            Ok(name) => name,
            Err(e) => {
                warn!(error = %e, "Could not read viewer name");
                self.scanner.capture().viewer_name()
            }
        };
        HarvestStatus {
            active: self.is_active(),
            records: self.archive.records.len(),
            downloads: self.archive.queue.progress(),
            downloads_paused: self.worker.is_paused(),
            viewer_name,
        }
    }

    /// Detect the viewer's name from the page, persist it and use it for
    /// redaction from now on. A manual override still wins for redaction.
    /// Once found, the name is returned without walking the page again.
    pub async fn detect_name(&self) -> anyhow::Result<Option<String>> {
        let cached = self
            .detected_name
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(name) = cached {
            return Ok(Some(name));
        }

        let Some((name, source)) = detect_viewer_name(&self.host.root()) else {
            info!("Viewer name not found on page");
            return Ok(None);
        };
        info!(?source, "Viewer name detected");
        self.archive.names.set_viewer_name(&name).await?;
        self.scanner
            .capture()
            .set_viewer_name(self.archive.names.effective_name().await?);
        *self.detected_name.lock().unwrap_or_else(|e| e.into_inner()) = Some(name.clone());
        Ok(Some(name))
    }

    /// An empty name clears the override.
    pub async fn set_manual_name(&self, name: &str) -> anyhow::Result<()> {
        self.archive.names.set_manual_override(name).await?;
        self.scanner
            .capture()
            .set_viewer_name(self.archive.names.effective_name().await?);
        Ok(())
    }

    pub fn records(&self) -> Vec<Record> {
        self.archive.records.records()
    }

    pub fn count(&self) -> usize {
        self.archive.records.len()
    }

    pub fn download_progress(&self) -> DownloadProgress {
        self.archive.queue.progress()
    }

    /// Records with the effective viewer name redacted.
    pub async fn export(&self) -> anyhow::Result<Vec<Record>> {
        let name = self.archive.names.effective_name().await?;
        Ok(export_records(self.records(), name.as_deref()))
    }

    pub async fn clear_all(&self) -> anyhow::Result<()> {
        self.archive.clear_all().await?;
        self.scanner.capture().reset();
        Ok(())
    }

    pub async fn retry_failed_downloads(&self) -> anyhow::Result<usize> {
        Ok(self.worker.retry_failed().await?)
    }

    pub fn pause_downloads(&self) {
        self.worker.pause();
    }

    pub fn resume_downloads(&self) {
        self.worker.resume();
    }
}

/// Apply viewer-name redaction to every record's text.
pub fn export_records(records: Vec<Record>, viewer_name: Option<&str>) -> Vec<Record> {
    let Some(name) = viewer_name.filter(|n| !n.trim().is_empty()) else {
        return records;
    };
    records
        .into_iter()
        .map(|mut record| {
            record.text = redact_viewer_name(&record.text, name);
            record
        })
        .collect()
}

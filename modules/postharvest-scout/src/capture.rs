//! Capture controller: expansion, extraction, rejection, dedup, storage.
//!
//! Per container the state moves unseen → checked (rejected) or unseen → done
//! (accepted). A short accepted capture with a permalink stays replaceable
//! until its single re-expansion attempt has run.

use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use postharvest_archive::{plan_assets, Admission, Archive, QueueWorker};
use postharvest_common::{Record, StoreOutcome};
use postharvest_extract::rules::{self, TextClass};
use postharvest_extract::{extract_record, find_expansion_controls, DocumentNode};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::events::HarvestEvent;
use crate::host::HostPage;
use crate::marking::{ContainerMarks, Mark};
use crate::settings::HarvestSettings;

/// Why a container was judged not to be a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Empty,
    NonPostPrefix,
    NotificationPanel,
    UnreadMarkers,
    SidebarLabel,
    FollowerSignature,
    DegenerateRepetition,
}

/// What happened to one container.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    AlreadyMarked,
    Rejected(Rejection),
    /// Same content already stored, or not longer than the stored capture.
    Discarded,
    Stored(StoreOutcome),
    /// The store write failed; the container is unmarked so the next scan retries.
    Failed,
}

/// Decide whether extracted content is a post. `rendered` is the container's
/// full rendered text, which keeps repetition the normalizer folds away.
pub fn rejection(record: &Record, rendered: &str) -> Option<Rejection> {
    if record.is_empty() {
        return Some(Rejection::Empty);
    }

    let text = record.text.trim();
    let rendered = rendered.trim();
    let either = |class: TextClass| rules::matches(class, text) || rules::matches(class, rendered);

    if either(TextClass::NonPostPrefix) {
        return Some(Rejection::NonPostPrefix);
    }
    if either(TextClass::NotificationPanel) {
        return Some(Rejection::NotificationPanel);
    }

    let unread_lines = rendered
        .lines()
        .filter(|l| rules::matches(TextClass::UnreadMarker, l.trim()))
        .count();
    let only_unread = !text.is_empty()
        && text
            .lines()
            .filter(|l| !l.trim().is_empty())
            .all(|l| rules::matches(TextClass::UnreadMarker, l.trim()));
    if unread_lines >= 2 || only_unread {
        return Some(Rejection::UnreadMarkers);
    }

    let first_line = |s: &str| s.lines().next().unwrap_or_default().trim().to_string();
    if rules::matches(TextClass::SidebarLabel, &first_line(text))
        || rules::matches(TextClass::SidebarLabel, &first_line(rendered))
    {
        return Some(Rejection::SidebarLabel);
    }
    if either(TextClass::FollowerSignature) {
        return Some(Rejection::FollowerSignature);
    }

    for body in [text, rendered] {
        let lines: Vec<&str> = body.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
        let mut distinct = lines.clone();
        distinct.sort_unstable();
        distinct.dedup();
        if lines.len() > 3 && distinct.len() <= 2 {
            return Some(Rejection::DegenerateRepetition);
        }
    }

    None
}

struct FollowUp<N> {
    container: N,
    permalink: String,
    due: Instant,
}

pub struct CaptureController<N: DocumentNode> {
    archive: Archive,
    worker: Arc<QueueWorker>,
    settings: HarvestSettings,
    marks: Mutex<ContainerMarks<N::Key>>,
    followups: Mutex<Vec<FollowUp<N>>>,
    viewer_name: RwLock<Option<String>>,
    events: broadcast::Sender<HarvestEvent>,
}

impl<N: DocumentNode> CaptureController<N> {
    pub fn new(
        archive: Archive,
        worker: Arc<QueueWorker>,
        settings: HarvestSettings,
        events: broadcast::Sender<HarvestEvent>,
    ) -> Self {
        Self {
            archive,
            worker,
            settings,
            marks: Mutex::new(ContainerMarks::default()),
            followups: Mutex::new(Vec::new()),
            viewer_name: RwLock::new(None),
            events,
        }
    }

    pub fn archive(&self) -> &Archive {
        &self.archive
    }

    pub fn set_viewer_name(&self, name: Option<String>) {
        *self.viewer_name.write().unwrap_or_else(|e| e.into_inner()) =
            name.filter(|n| !n.trim().is_empty());
    }

    pub fn viewer_name(&self) -> Option<String> {
        self.viewer_name.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn mark(&self, container: &N) -> Option<Mark> {
        self.marks().get(container.key())
    }

    pub fn is_done(&self, container: &N) -> bool {
        self.marks().is_done(container.key())
    }

    pub fn pending_followups(&self) -> usize {
        self.followups().len()
    }

    /// Visit a container once: expand, extract, filter, dedup, store.
    pub async fn capture<H>(&self, host: &H, container: &N) -> CaptureOutcome
    where
        H: HostPage<Node = N>,
    {
        self.capture_inner(host, container, false).await
    }

    /// Capture a container even if it is already done, for blocks the index
    /// holds only a truncated copy of. Rejected containers stay rejected.
    pub async fn recapture<H>(&self, host: &H, container: &N) -> CaptureOutcome
    where
        H: HostPage<Node = N>,
    {
        self.capture_inner(host, container, true).await
    }

    async fn capture_inner<H>(&self, host: &H, container: &N, force: bool) -> CaptureOutcome
    where
        H: HostPage<Node = N>,
    {
        let key = container.key();
        {
            let mut marks = self.marks();
            match marks.get(key) {
                None => {}
                Some(Mark::Done { .. }) if force => {}
                Some(_) => return CaptureOutcome::AlreadyMarked,
            }
            // Claimed before the settle delay so an overlapping scan skips it.
            marks.mark_done(key, false);
        }

        self.expand(host, container).await;
        let record = extract_record(container, self.viewer_name().as_deref());
        let rendered = container.trimmed_text();

        if let Some(reason) = rejection(&record, &rendered) {
            self.marks().mark_checked(key);
            debug!(?reason, author = %record.author, "Rejected container");
            return CaptureOutcome::Rejected(reason);
        }

        let outcome = self.store(record.clone()).await;
        match &outcome {
            CaptureOutcome::Failed => self.marks().unmark(key),
            CaptureOutcome::Stored(_) => {
                if let Some(permalink) = &record.permalink {
                    if record.text_len() < self.settings.short_capture_chars {
                        self.marks().mark_done(key, true);
                        self.followups().push(FollowUp {
                            container: container.clone(),
                            permalink: permalink.clone(),
                            due: Instant::now() + self.settings.reexpansion_delay,
                        });
                    }
                }
            }
            _ => {}
        }
        outcome
    }

    /// Run re-expansion for short captures whose delay has elapsed. Each gets
    /// one attempt; a strictly longer result replaces the stored record
    /// without going through rejection again.
    pub async fn run_due_followups<H>(&self, host: &H) -> usize
    where
        H: HostPage<Node = N>,
    {
        let now = Instant::now();
        let due: Vec<FollowUp<N>> = {
            let mut followups = self.followups();
            let (due, later): (Vec<_>, Vec<_>) = followups.drain(..).partition(|f| f.due <= now);
            *followups = later;
            due
        };

        let mut replaced = 0;
        for followup in due {
            self.expand(host, &followup.container).await;
            let record = extract_record(&followup.container, self.viewer_name().as_deref());
            self.marks().mark_done(followup.container.key(), false);

            if record.permalink.as_deref() != Some(followup.permalink.as_str()) {
                continue;
            }
            let known = self.archive.dedup.best_len(&followup.permalink).unwrap_or(0);
            if record.text_len() <= known {
                continue;
            }
            if let CaptureOutcome::Stored(StoreOutcome::Replaced { .. }) = self.store(record).await {
                replaced += 1;
            }
        }
        replaced
    }

    /// Best-effort: click every expansion control and wait for the render.
    async fn expand<H>(&self, host: &H, container: &N)
    where
        H: HostPage<Node = N>,
    {
        let controls = find_expansion_controls(container);
        if controls.is_empty() {
            return;
        }
        for control in &controls {
            host.activate(control).await;
        }
        tokio::time::sleep(self.settings.expansion_settle).await;
    }

    async fn store(&self, record: Record) -> CaptureOutcome {
        let ticket = match self.archive.dedup.admit(&record) {
            Admission::New(ticket) | Admission::Replace(ticket) => ticket,
            Admission::Duplicate => {
                debug!(author = %record.author, "Duplicate content, discarded");
                return CaptureOutcome::Discarded;
            }
            Admission::NotLonger { known_len } => {
                debug!(known_len, len = record.text_len(), "Not longer than stored capture");
                return CaptureOutcome::Discarded;
            }
        };

        let outcome = match self.archive.records.submit(record.clone()).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, author = %record.author, "Failed to store record");
                self.archive.dedup.rollback(ticket);
                return CaptureOutcome::Failed;
            }
        };

        let index = outcome.index();
        let event = match outcome {
            StoreOutcome::Appended { .. } => {
                info!(index, author = %record.author, len = record.text_len(), "New post captured");
                HarvestEvent::New {
                    index,
                    record: record.clone(),
                }
            }
            StoreOutcome::Replaced { .. } => {
                info!(index, author = %record.author, len = record.text_len(), "Post replaced with longer capture");
                HarvestEvent::Replace {
                    index,
                    record: record.clone(),
                }
            }
        };
        let _ = self.events.send(event);

        match self.worker.queue().enqueue(plan_assets(index, &record)).await {
            Ok(0) => {}
            Ok(added) => {
                debug!(index, added, "Queued assets");
                self.worker.kick();
            }
            Err(e) => warn!(error = %e, index, "Failed to queue assets"),
        }

        CaptureOutcome::Stored(outcome)
    }

    /// Forget marks and pending follow-ups (full clear).
    pub fn reset(&self) {
        self.marks().clear();
        self.followups().clear();
    }

    fn marks(&self) -> MutexGuard<'_, ContainerMarks<N::Key>> {
        self.marks.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn followups(&self) -> MutexGuard<'_, Vec<FollowUp<N>>> {
        self.followups.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(author: &str, text: &str) -> Record {
        Record {
            author: author.into(),
            text: text.into(),
            timestamp: String::new(),
            permalink: None,
            reactions_label: String::new(),
            comments_label: String::new(),
            images: Vec::new(),
            videos: Vec::new(),
            local_files: Vec::new(),
            captured_at: Utc::now(),
        }
    }

    #[test]
    fn unread_markers_are_rejected() {
        let text = "Unread\nUnread\nUnread";
        assert_eq!(rejection(&record("", text), text), Some(Rejection::UnreadMarkers));
        assert_eq!(rejection(&record("", "Unread"), text), Some(Rejection::UnreadMarkers));
    }

    #[test]
    fn plain_post_is_accepted() {
        let text = "Hello world, this is my post today.";
        assert_eq!(rejection(&record("Jane Doe", text), text), None);
    }

    #[test]
    fn empty_record_is_rejected() {
        assert_eq!(rejection(&record("", " "), ""), Some(Rejection::Empty));
    }

    #[test]
    fn panels_and_sidebars_are_rejected() {
        assert_eq!(
            rejection(&record("", "Your push notifications are off"), ""),
            Some(Rejection::NonPostPrefix)
        );
        assert_eq!(
            rejection(&record("", "Earlier posts\nMark all as read"), ""),
            Some(Rejection::NotificationPanel)
        );
        assert_eq!(
            rejection(&record("", "Your shortcuts\nGardening Club"), ""),
            Some(Rejection::SidebarLabel)
        );
        assert_eq!(
            rejection(&record("City Paper", "City Paper\nPage · 1.2K likes · 3K followers"), ""),
            Some(Rejection::FollowerSignature)
        );
    }

    #[test]
    fn degenerate_repetition_is_rejected() {
        let rendered = "Ad\nBuy\nAd\nBuy\nAd";
        assert_eq!(
            rejection(&record("Shop", "Ad\nBuy"), rendered),
            Some(Rejection::DegenerateRepetition)
        );
    }
}

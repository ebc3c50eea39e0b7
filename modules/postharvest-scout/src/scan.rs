//! Full-tree scan: candidates → containers → capture.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use postharvest_extract::extractor::{extract_timestamp, is_post_href};
use postharvest_extract::rules::{self, TextClass};
use postharvest_extract::{
    clean_text, find_container, is_large_wrapper, DocumentNode, MAX_ANCESTOR_DEPTH,
};
use tracing::debug;

use crate::capture::{CaptureController, CaptureOutcome};
use crate::host::HostPage;

/// Text blocks shorter than this are not scan candidates.
const MIN_CANDIDATE_CHARS: usize = 8;
/// Blocks at least this long get the secondary pass.
const LARGE_BLOCK_CHARS: usize = 100;
/// A stored capture shorter than this share of a visible block is truncated.
const COMPARABLE_LENGTH: f64 = 0.8;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanReport {
    pub candidates: usize,
    pub containers: usize,
    pub stored: usize,
    pub rejected: usize,
    pub recaptured: usize,
}

pub struct Scanner<N: DocumentNode> {
    capture: Arc<CaptureController<N>>,
    busy: AtomicBool,
}

impl<N: DocumentNode> Scanner<N> {
    pub fn new(capture: Arc<CaptureController<N>>) -> Self {
        Self {
            capture,
            busy: AtomicBool::new(false),
        }
    }

    pub fn capture(&self) -> &Arc<CaptureController<N>> {
        &self.capture
    }

    /// Run one scan. Returns `None` when another scan is already running.
    pub async fn scan<H>(&self, host: &H) -> Option<ScanReport>
    where
        H: HostPage<Node = N>,
    {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Scan already running");
            return None;
        }
        let _busy = ScanGuard(&self.busy);

        let mut report = ScanReport::default();
        let candidates = candidates(&host.root());
        report.candidates = candidates.len();

        let mut seen = HashSet::new();
        let mut unresolved = 0;
        for block in &candidates {
            let Some(container) = find_container(block) else {
                unresolved += 1;
                continue;
            };
            if !seen.insert(container.key()) {
                continue;
            }
            if self.capture.mark(&container).is_some() || self.nested_in_done(&container) {
                continue;
            }
            report.containers += 1;
            match self.capture.capture(host, &container).await {
                CaptureOutcome::Stored(_) => report.stored += 1,
                CaptureOutcome::Rejected(_) => report.rejected += 1,
                _ => {}
            }
        }

        for block in candidates
            .iter()
            .filter(|b| b.trimmed_text().chars().count() > LARGE_BLOCK_CHARS)
        {
            if self.recapture_truncated(host, block).await {
                report.recaptured += 1;
            }
        }

        if report.stored > 0 || report.recaptured > 0 {
            debug!(
                candidates = report.candidates,
                stored = report.stored,
                recaptured = report.recaptured,
                unresolved,
                "Scan finished"
            );
        }
        Some(report)
    }

    /// A small accepted ancestor owns this container. Large wrappers never
    /// count, so one mislabeled wrapper cannot hide the posts below it.
    fn nested_in_done(&self, container: &N) -> bool {
        container
            .ancestors()
            .iter()
            .any(|a| !is_large_wrapper(a) && self.capture.is_done(a))
    }

    /// A long block whose post is stored shorter than the block's cleaned text,
    /// or not stored at all, is captured again from its nearest permalink owner.
    async fn recapture_truncated<H>(&self, host: &H, block: &N) -> bool
    where
        H: HostPage<Node = N>,
    {
        let Some(owner) = permalink_owner(block) else {
            return false;
        };
        let (_, Some(permalink)) = extract_timestamp(&owner) else {
            return false;
        };

        let viewer = self.capture.viewer_name();
        let visible = clean_text(&block.trimmed_text(), viewer.as_deref()).chars().count() as f64;
        let stored = self.capture.archive().dedup.best_len(&permalink);
        if stored.is_some_and(|len| len as f64 >= visible * COMPARABLE_LENGTH) {
            return false;
        }

        debug!(permalink = %permalink, stored, visible, "Recapturing truncated post");
        matches!(
            self.capture.recapture(host, &owner).await,
            CaptureOutcome::Stored(_)
        )
    }
}

/// Text-bearing `div`/`span` blocks, in document order.
pub fn candidates<N: DocumentNode>(root: &N) -> Vec<N> {
    root.find_all(|el| {
        if !el.has_tag(&["div", "span"]) || el.attr("dir").as_deref() != Some("auto") {
            return false;
        }
        let text = el.trimmed_text();
        text.chars().count() >= MIN_CANDIDATE_CHARS && !rules::matches(TextClass::UiChrome, &text)
    })
}

/// The nearest non-wrapper ancestor (or the block itself) holding a post link.
pub fn permalink_owner<N: DocumentNode>(block: &N) -> Option<N> {
    std::iter::once(block.clone())
        .chain(block.ancestors())
        .take(MAX_ANCESTOR_DEPTH)
        .filter(|node| !is_large_wrapper(node))
        .find(|node| {
            node.find_first(|el| {
                el.tag() == "a" && el.attr("href").is_some_and(|href| is_post_href(&href))
            })
            .is_some()
        })
}

struct ScanGuard<'a>(&'a AtomicBool);

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use postharvest_extract::DomTree;

    const PAGE: &str = r#"<html><body>
      <div id="post">
        <h3><a href="/ana">Ana</a></h3>
        <span><a href="/ana/posts/7">2h</a></span>
        <div dir="auto" id="text">A long enough line of post text</div>
        <div dir="auto">Like</div>
        <span dir="auto">short</span>
      </div>
    </body></html>"#;

    #[test]
    fn candidates_skip_chrome_and_short_blocks() {
        let tree = DomTree::parse(PAGE);
        let found = candidates(&tree.body());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].attr("id").as_deref(), Some("text"));
    }

    #[test]
    fn permalink_owner_is_nearest_linked_ancestor() {
        let tree = DomTree::parse(PAGE);
        let block = tree.element_by_id("text").unwrap();
        let owner = permalink_owner(&block).unwrap();
        assert_eq!(owner.attr("id").as_deref(), Some("post"));
    }
}

//! Test doubles for driving a harvest session without a browser.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use postharvest_archive::{AssetTransfer, TransferError};
use postharvest_extract::{DocumentNode, DomNode, DomTree};
use tokio::sync::broadcast;

use crate::host::{HostPage, MutationBatch};

/// Height added to the page for each `grow` call.
pub const GROWTH_PX: f64 = 1200.0;

#[derive(Debug, Clone)]
struct Expansion {
    target_id: String,
    html: String,
}

#[derive(Debug)]
struct ScrollState {
    offset: f64,
    height: f64,
    /// Where the next scroll lands instead of where it was asked to go.
    jump_to: Option<f64>,
    log: Vec<f64>,
}

/// A mutable page over [`DomTree`]. Expansion controls are scripted by element
/// id; content growth and scroll jumps are triggered by the test.
pub struct ScriptedPage {
    tree: DomTree,
    viewport: f64,
    scroll: Mutex<ScrollState>,
    expansions: Mutex<HashMap<String, Expansion>>,
    activations: Mutex<Vec<String>>,
    mutations: broadcast::Sender<MutationBatch>,
}

impl ScriptedPage {
    pub fn new(html: &str) -> Self {
        let (mutations, _) = broadcast::channel(64);
        Self {
            tree: DomTree::parse(html),
            viewport: 900.0,
            scroll: Mutex::new(ScrollState {
                offset: 0.0,
                height: 2000.0,
                jump_to: None,
                log: Vec::new(),
            }),
            expansions: Mutex::new(HashMap::new()),
            activations: Mutex::new(Vec::new()),
            mutations,
        }
    }

    pub fn tree(&self) -> &DomTree {
        &self.tree
    }

    /// Activating the element with id `control_id` replaces the children of
    /// `target_id` with `html`.
    pub fn script_expansion(&self, control_id: &str, target_id: &str, html: &str) {
        self.expansions.lock().unwrap().insert(
            control_id.to_string(),
            Expansion {
                target_id: target_id.to_string(),
                html: html.to_string(),
            },
        );
    }

    pub fn activations(&self) -> Vec<String> {
        self.activations.lock().unwrap().clone()
    }

    /// Append content to the element with id `parent_id` (the body when
    /// absent), grow the page and report the mutation.
    pub fn grow(&self, parent_id: &str, html: &str) -> Vec<DomNode> {
        let parent = self
            .tree
            .element_by_id(parent_id)
            .unwrap_or_else(|| self.tree.body());
        let added = self.tree.append_html(&parent, html);
        self.scroll.lock().unwrap().height += GROWTH_PX;
        self.notify(added.len());
        added
    }

    /// Report a mutation batch without changing anything.
    pub fn notify(&self, records: usize) {
        let _ = self.mutations.send(MutationBatch { records });
    }

    pub fn set_height(&self, height: f64) {
        self.scroll.lock().unwrap().height = height;
    }

    /// Make the next scroll land at `offset`, as a virtualized list does when
    /// it skips content.
    pub fn jump_next_scroll(&self, offset: f64) {
        self.scroll.lock().unwrap().jump_to = Some(offset);
    }

    /// Every offset the page was scrolled to, in order.
    pub fn scroll_log(&self) -> Vec<f64> {
        self.scroll.lock().unwrap().log.clone()
    }
}

#[async_trait]
impl HostPage for ScriptedPage {
    type Node = DomNode;

    fn root(&self) -> DomNode {
        self.tree.body()
    }

    async fn activate(&self, node: &DomNode) -> bool {
        let Some(id) = node.attr("id") else {
            return false;
        };
        self.activations.lock().unwrap().push(id.clone());
        let Some(expansion) = self.expansions.lock().unwrap().remove(&id) else {
            return false;
        };
        let Some(target) = self.tree.element_by_id(&expansion.target_id) else {
            return false;
        };
        let added = self.tree.replace_children(&target, &expansion.html);
        self.notify(added.len());
        true
    }

    fn scroll_height(&self) -> f64 {
        self.scroll.lock().unwrap().height
    }

    fn scroll_offset(&self) -> f64 {
        self.scroll.lock().unwrap().offset
    }

    fn viewport_height(&self) -> f64 {
        self.viewport
    }

    async fn scroll_to(&self, offset: f64) {
        let mut scroll = self.scroll.lock().unwrap();
        let target = scroll.jump_to.take().unwrap_or(offset);
        let max = (scroll.height - self.viewport).max(0.0);
        scroll.offset = target.clamp(0.0, max);
        let landed = scroll.offset;
        scroll.log.push(landed);
    }

    fn mutations(&self) -> broadcast::Receiver<MutationBatch> {
        self.mutations.subscribe()
    }
}

/// Transfer double: records every URL, fails the ones marked failing, and
/// reports files under `/downloads`.
#[derive(Default)]
pub struct RecordingTransfer {
    calls: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingTransfer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self, url: &str) {
        self.failing.lock().unwrap().insert(url.to_string());
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AssetTransfer for RecordingTransfer {
    async fn fetch(&self, url: &str, destination: &str) -> Result<String, TransferError> {
        tokio::task::yield_now().await;
        self.calls.lock().unwrap().push(url.to_string());
        if self.failing.lock().unwrap().contains(url) {
            return Err(TransferError::new("interrupted: NETWORK_FAILED"));
        }
        Ok(format!("/downloads/{destination}"))
    }
}

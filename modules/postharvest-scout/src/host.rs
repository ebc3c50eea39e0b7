//! The host environment seam: a live document tree, a mutation channel and a
//! scroll viewport.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use postharvest_extract::{DocumentNode, DomNode, DomTree};
use tokio::sync::broadcast;

/// One batch of tree mutations as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationBatch {
    pub records: usize,
}

#[async_trait]
pub trait HostPage: Send + Sync + 'static {
    type Node: DocumentNode;

    /// The document body.
    fn root(&self) -> Self::Node;

    /// Click a control. Returns false when the host could not act on it.
    async fn activate(&self, node: &Self::Node) -> bool;

    fn scroll_height(&self) -> f64;
    fn scroll_offset(&self) -> f64;
    fn viewport_height(&self) -> f64;

    async fn scroll_to(&self, offset: f64);

    async fn scroll_by(&self, delta: f64) {
        let target = self.scroll_offset() + delta;
        self.scroll_to(target).await;
    }

    fn mutations(&self) -> broadcast::Receiver<MutationBatch>;
}

// ---------------------------------------------------------------------------
// SnapshotPage (static HTML)
// ---------------------------------------------------------------------------

/// A saved page. Nothing expands, nothing loads on scroll, and the mutation
/// channel stays silent, so a session over it converges in a few ticks.
pub struct SnapshotPage {
    tree: DomTree,
    offset: AtomicU64,
    viewport: f64,
    height: f64,
    mutations: broadcast::Sender<MutationBatch>,
}

impl SnapshotPage {
    pub fn new(html: &str) -> Self {
        let tree = DomTree::parse(html);
        let (mutations, _) = broadcast::channel(16);
        let viewport = 900.0;
        let height = (tree.elements().len() as f64 * 20.0).max(viewport);
        Self {
            tree,
            offset: AtomicU64::new(0f64.to_bits()),
            viewport,
            height,
            mutations,
        }
    }

    pub fn tree(&self) -> &DomTree {
        &self.tree
    }
}

#[async_trait]
impl HostPage for SnapshotPage {
    type Node = DomNode;

    fn root(&self) -> DomNode {
        self.tree.body()
    }

    async fn activate(&self, _node: &DomNode) -> bool {
        false
    }

    fn scroll_height(&self) -> f64 {
        self.height
    }

    fn scroll_offset(&self) -> f64 {
        f64::from_bits(self.offset.load(Ordering::SeqCst))
    }

    fn viewport_height(&self) -> f64 {
        self.viewport
    }

    async fn scroll_to(&self, offset: f64) {
        let clamped = offset.clamp(0.0, (self.height - self.viewport).max(0.0));
        self.offset.store(clamped.to_bits(), Ordering::SeqCst);
    }

    fn mutations(&self) -> broadcast::Receiver<MutationBatch> {
        self.mutations.subscribe()
    }
}

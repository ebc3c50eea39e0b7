//! The labeled-tree capability set the extractors work against.
//!
//! Hosts re-randomize class names, so nothing here looks at `class`. The
//! heuristics only need children, rendered text, attributes and ancestry.

use std::fmt::Debug;
use std::hash::Hash;

/// A node in a live, possibly mutating document tree.
///
/// Only element nodes are exposed. Text is reached through [`DocumentNode::text`],
/// which returns the node's rendered text with block boundaries as newlines.
pub trait DocumentNode: Clone + Send + Sync + 'static {
    /// Stable identity for the lifetime of the node, used for container marking.
    type Key: Copy + Eq + Hash + Debug + Send + Sync + 'static;

    fn key(&self) -> Self::Key;

    /// Lowercase tag name.
    fn tag(&self) -> String;

    fn attr(&self, name: &str) -> Option<String>;

    fn parent(&self) -> Option<Self>;

    /// Direct element children in document order.
    fn children(&self) -> Vec<Self>;

    /// Rendered text of this subtree.
    fn text(&self) -> String;

    /// Text including non-rendered content such as script bodies.
    fn raw_text(&self) -> String {
        self.text()
    }

    /// The document body (or the root element when there is no body).
    fn is_root(&self) -> bool {
        self.parent().is_none() || self.tag() == "body"
    }

    fn child_count(&self) -> usize {
        self.children().len()
    }

    fn has_tag(&self, tags: &[&str]) -> bool {
        let tag = self.tag();
        tags.iter().any(|t| *t == tag)
    }

    /// Trimmed rendered text.
    fn trimmed_text(&self) -> String {
        self.text().trim().to_string()
    }

    /// Every element below this one, in document order.
    fn descendants(&self) -> Vec<Self> {
        let mut out = Vec::new();
        let mut stack: Vec<Self> = self.children().into_iter().rev().collect();
        while let Some(node) = stack.pop() {
            stack.extend(node.children().into_iter().rev());
            out.push(node);
        }
        out
    }

    fn find_all<F: Fn(&Self) -> bool>(&self, pred: F) -> Vec<Self> {
        self.descendants().into_iter().filter(|n| pred(n)).collect()
    }

    fn find_first<F: Fn(&Self) -> bool>(&self, pred: F) -> Option<Self> {
        self.descendants().into_iter().find(|n| pred(n))
    }

    /// Parent chain, nearest first, stopping before the document root.
    fn ancestors(&self) -> Vec<Self> {
        let mut out = Vec::new();
        let mut current = self.parent();
        while let Some(node) = current {
            if node.is_root() {
                break;
            }
            current = node.parent();
            out.push(node);
        }
        out
    }

    fn is_descendant_of(&self, other: &Self) -> bool {
        let target = other.key();
        let mut current = self.parent();
        while let Some(node) = current {
            if node.key() == target {
                return true;
            }
            current = node.parent();
        }
        false
    }
}

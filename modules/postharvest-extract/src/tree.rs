//! Owned, shareable document tree built from HTML.
//!
//! `scraper::Html` is neither `Send` nor mutable after parsing, so the parsed
//! document is copied into an index arena behind an `RwLock`. Node indices are
//! never reused: appended content gets fresh indices and detached nodes stay in
//! the arena, which keeps node identity stable across mutations.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use scraper::{Html, Node};

use crate::dom::DocumentNode;

/// Elements whose contents never render.
const NON_RENDERED: &[&str] = &["script", "style", "template", "head", "noscript", "title"];

/// Elements that start and end a line when rendered.
const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "div", "dl", "dd", "dt", "figcaption",
    "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li",
    "main", "nav", "ol", "p", "pre", "section", "table", "tr", "ul",
];

#[derive(Debug)]
enum NodeKind {
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
    },
    Text(String),
}

#[derive(Debug)]
struct NodeData {
    kind: NodeKind,
    parent: Option<usize>,
    children: Vec<usize>,
}

#[derive(Debug)]
struct Arena {
    nodes: Vec<NodeData>,
    root: usize,
}

impl Arena {
    fn empty() -> Self {
        let mut arena = Arena {
            nodes: Vec::new(),
            root: 0,
        };
        arena.root = arena.push(
            None,
            NodeKind::Element {
                tag: "#document".to_string(),
                attrs: Vec::new(),
            },
        );
        arena
    }

    fn push(&mut self, parent: Option<usize>, kind: NodeKind) -> usize {
        let id = self.nodes.len();
        self.nodes.push(NodeData {
            kind,
            parent,
            children: Vec::new(),
        });
        if let Some(p) = parent {
            self.nodes[p].children.push(id);
        }
        id
    }

    fn is_element(&self, id: usize) -> bool {
        matches!(self.nodes[id].kind, NodeKind::Element { .. })
    }

    fn tag(&self, id: usize) -> &str {
        match &self.nodes[id].kind {
            NodeKind::Element { tag, .. } => tag,
            NodeKind::Text(_) => "#text",
        }
    }

    fn attr(&self, id: usize, name: &str) -> Option<&str> {
        match &self.nodes[id].kind {
            NodeKind::Element { attrs, .. } => attrs
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str()),
            NodeKind::Text(_) => None,
        }
    }

    /// Copy a parsed HTML tree under `parent`. `skip_wrappers` drops the
    /// `html`/`body` wrappers `parse_fragment` adds so only the content lands.
    fn graft(&mut self, html: &Html, parent: usize, skip_wrappers: bool) -> Vec<usize> {
        let mut mapped = HashMap::new();
        let mut top_level = Vec::new();

        for node in html.tree.root().descendants() {
            let parent_id = match node.parent() {
                Some(p) => mapped.get(&p.id()).copied().unwrap_or(parent),
                None => continue,
            };
            let kind = match node.value() {
                Node::Element(el) => {
                    if skip_wrappers && matches!(el.name(), "html" | "body" | "head") {
                        mapped.insert(node.id(), parent_id);
                        continue;
                    }
                    NodeKind::Element {
                        tag: el.name().to_ascii_lowercase(),
                        attrs: el
                            .attrs()
                            .map(|(k, v)| (k.to_string(), v.to_string()))
                            .collect(),
                    }
                }
                Node::Text(t) => NodeKind::Text(t.to_string()),
                _ => continue,
            };
            let id = self.push(Some(parent_id), kind);
            if parent_id == parent && self.is_element(id) {
                top_level.push(id);
            }
            mapped.insert(node.id(), id);
        }

        top_level
    }

    fn render(&self, id: usize, out: &mut String) {
        match &self.nodes[id].kind {
            NodeKind::Text(t) => {
                let mut first = true;
                for word in t.split_whitespace() {
                    let lead = t.starts_with(char::is_whitespace)
                        && !ends_with_break(out)
                        && !out.ends_with(' ');
                    if !first || lead {
                        out.push(' ');
                    }
                    out.push_str(word);
                    first = false;
                }
                if !first && t.ends_with(char::is_whitespace) {
                    out.push(' ');
                }
            }
            NodeKind::Element { tag, attrs } => {
                if NON_RENDERED.contains(&tag.as_str()) || attrs.iter().any(|(k, _)| k == "hidden")
                {
                    return;
                }
                if tag == "br" {
                    out.push('\n');
                    return;
                }
                let block = BLOCK_TAGS.contains(&tag.as_str());
                if block && !ends_with_break(out) {
                    out.push('\n');
                }
                for child in &self.nodes[id].children {
                    self.render(*child, out);
                }
                if block && !ends_with_break(out) {
                    out.push('\n');
                }
            }
        }
    }
}

fn ends_with_break(s: &str) -> bool {
    s.is_empty() || s.ends_with('\n')
}

/// Collapse the raw render into trimmed, non-empty lines.
fn tidy_render(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// A document tree that can be shared across tasks and mutated in place.
#[derive(Clone, Debug)]
pub struct DomTree {
    arena: Arc<RwLock<Arena>>,
}

impl DomTree {
    /// Parse a full HTML document.
    pub fn parse(html: &str) -> Self {
        let parsed = Html::parse_document(html);
        let mut arena = Arena::empty();
        let root = arena.root;
        arena.graft(&parsed, root, false);
        Self {
            arena: Arc::new(RwLock::new(arena)),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Arena> {
        self.arena.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Arena> {
        self.arena.write().unwrap_or_else(|e| e.into_inner())
    }

    fn node(&self, id: usize) -> DomNode {
        DomNode {
            arena: self.arena.clone(),
            id,
        }
    }

    /// The `<body>` element, or the root element when the document has none.
    pub fn body(&self) -> DomNode {
        let found = {
            let arena = self.read();
            (0..arena.nodes.len()).find(|id| arena.is_element(*id) && arena.tag(*id) == "body")
        };
        match found {
            Some(id) => self.node(id),
            None => self.node(self.read().root),
        }
    }

    /// Every attached element in document order.
    pub fn elements(&self) -> Vec<DomNode> {
        let root = self.read().root;
        self.node(root).descendants()
    }

    /// First element whose `id` attribute matches.
    pub fn element_by_id(&self, dom_id: &str) -> Option<DomNode> {
        let found = {
            let arena = self.read();
            (0..arena.nodes.len()).find(|id| arena.attr(*id, "id") == Some(dom_id))
        };
        found.map(|id| self.node(id))
    }

    /// Parse `html` as a fragment and append its top-level elements to `parent`.
    pub fn append_html(&self, parent: &DomNode, html: &str) -> Vec<DomNode> {
        let parsed = Html::parse_fragment(html);
        let ids = self.write().graft(&parsed, parent.id, true);
        ids.into_iter().map(|id| self.node(id)).collect()
    }

    /// Replace the children of `node` with the parsed fragment.
    pub fn replace_children(&self, node: &DomNode, html: &str) -> Vec<DomNode> {
        {
            let mut arena = self.write();
            let old = std::mem::take(&mut arena.nodes[node.id].children);
            for child in old {
                arena.nodes[child].parent = None;
            }
        }
        self.append_html(node, html)
    }

    /// Detach a node from its parent. The node keeps its identity.
    pub fn detach(&self, node: &DomNode) {
        let mut arena = self.write();
        if let Some(parent) = arena.nodes[node.id].parent.take() {
            arena.nodes[parent].children.retain(|c| *c != node.id);
        }
    }

    pub fn set_attr(&self, node: &DomNode, name: &str, value: &str) {
        let mut arena = self.write();
        if let NodeKind::Element { attrs, .. } = &mut arena.nodes[node.id].kind {
            match attrs.iter_mut().find(|(k, _)| k == name) {
                Some(slot) => slot.1 = value.to_string(),
                None => attrs.push((name.to_string(), value.to_string())),
            }
        }
    }

    pub fn remove_attr(&self, node: &DomNode, name: &str) {
        let mut arena = self.write();
        if let NodeKind::Element { attrs, .. } = &mut arena.nodes[node.id].kind {
            attrs.retain(|(k, _)| k != name);
        }
    }

    /// Handle for a node of this tree, if `node` belongs to it.
    pub fn owns(&self, node: &DomNode) -> bool {
        Arc::ptr_eq(&self.arena, &node.arena)
    }
}

/// Element handle into a [`DomTree`].
#[derive(Clone, Debug)]
pub struct DomNode {
    arena: Arc<RwLock<Arena>>,
    id: usize,
}

impl DomNode {
    fn read(&self) -> RwLockReadGuard<'_, Arena> {
        self.arena.read().unwrap_or_else(|e| e.into_inner())
    }

    fn sibling(&self, id: usize) -> DomNode {
        DomNode {
            arena: self.arena.clone(),
            id,
        }
    }
}

impl PartialEq for DomNode {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && Arc::ptr_eq(&self.arena, &other.arena)
    }
}

impl Eq for DomNode {}

impl DocumentNode for DomNode {
    type Key = usize;

    fn key(&self) -> usize {
        self.id
    }

    fn tag(&self) -> String {
        self.read().tag(self.id).to_string()
    }

    fn attr(&self, name: &str) -> Option<String> {
        self.read().attr(self.id, name).map(str::to_string)
    }

    fn parent(&self) -> Option<Self> {
        let parent = self.read().nodes[self.id].parent;
        parent.map(|id| self.sibling(id))
    }

    fn children(&self) -> Vec<Self> {
        let ids: Vec<usize> = {
            let arena = self.read();
            arena.nodes[self.id]
                .children
                .iter()
                .copied()
                .filter(|c| arena.is_element(*c))
                .collect()
        };
        ids.into_iter().map(|id| self.sibling(id)).collect()
    }

    fn text(&self) -> String {
        let arena = self.read();
        let mut raw = String::new();
        arena.render(self.id, &mut raw);
        tidy_render(&raw)
    }

    fn raw_text(&self) -> String {
        let arena = self.read();
        let mut out = String::new();
        let mut stack = vec![self.id];
        while let Some(id) = stack.pop() {
            match &arena.nodes[id].kind {
                NodeKind::Text(t) => out.push_str(t),
                NodeKind::Element { .. } => {
                    stack.extend(arena.nodes[id].children.iter().rev().copied());
                }
            }
        }
        out
    }

    fn is_root(&self) -> bool {
        let arena = self.read();
        arena.nodes[self.id].parent.is_none() || matches!(arena.tag(self.id), "body" | "html")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_elements_and_text() {
        let tree = DomTree::parse("<html><body><div id='a'><span>Hi</span> there</div></body></html>");
        let a = tree.element_by_id("a").unwrap();
        assert_eq!(a.tag(), "div");
        assert_eq!(a.children().len(), 1);
        assert_eq!(a.text(), "Hi there");
    }

    #[test]
    fn block_elements_render_on_their_own_lines() {
        let tree = DomTree::parse("<body><div id='a'><p>One</p><p>Two</p>three<br>four</div></body>");
        let a = tree.element_by_id("a").unwrap();
        assert_eq!(a.text(), "One\nTwo\nthree\nfour");
    }

    #[test]
    fn scripts_and_hidden_do_not_render() {
        let tree = DomTree::parse(
            "<body><div id='a'>shown<script>var x=1;</script><span hidden>secret</span></div></body>",
        );
        let a = tree.element_by_id("a").unwrap();
        assert_eq!(a.text(), "shown");
        assert!(a.raw_text().contains("var x=1;"));
    }

    #[test]
    fn append_keeps_existing_identity() {
        let tree = DomTree::parse("<body><div id='feed'><div id='p1'>first</div></div></body>");
        let feed = tree.element_by_id("feed").unwrap();
        let p1 = tree.element_by_id("p1").unwrap();
        let added = tree.append_html(&feed, "<div id='p2'>second</div>");

        assert_eq!(added.len(), 1);
        assert_eq!(added[0].attr("id").as_deref(), Some("p2"));
        assert_eq!(tree.element_by_id("p1").unwrap(), p1);
        assert_eq!(feed.children().len(), 2);
        assert!(added[0].is_descendant_of(&feed));
    }

    #[test]
    fn replace_children_swaps_content() {
        let tree = DomTree::parse("<body><div id='x'><span>short…</span></div></body>");
        let x = tree.element_by_id("x").unwrap();
        tree.replace_children(&x, "<span>the full text</span>");
        assert_eq!(x.text(), "the full text");
    }

    #[test]
    fn ancestors_stop_at_body() {
        let tree = DomTree::parse("<body><div><section><span id='s'>x</span></section></div></body>");
        let s = tree.element_by_id("s").unwrap();
        let tags: Vec<String> = s.ancestors().iter().map(|n| n.tag()).collect();
        assert_eq!(tags, vec!["section", "div"]);
    }

    #[test]
    fn attributes_can_be_edited() {
        let tree = DomTree::parse("<body><div id='x'></div></body>");
        let x = tree.element_by_id("x").unwrap();
        tree.set_attr(&x, "aria-label", "Notifications");
        assert_eq!(x.attr("aria-label").as_deref(), Some("Notifications"));
        tree.remove_attr(&x, "aria-label");
        assert_eq!(x.attr("aria-label"), None);
    }
}

//! Container location: from a text-bearing node up to the node that holds one post.

use crate::dom::DocumentNode;
use crate::rules::{self, TextClass};

/// How far up the ancestor chain the walk goes.
pub const MAX_ANCESTOR_DEPTH: usize = 20;

/// Nodes with this many direct children are wrappers, not posts.
pub const LARGE_WRAPPER_CHILDREN: usize = 10;

const MIN_CHILDREN: usize = 3;
const MIN_TEXT_CHARS: usize = 20;
const BRAND_REPEAT_LIMIT: usize = 5;

const AUTHOR_TAGS: &[&str] = &["h1", "h2", "h3", "h4", "h5", "h6", "strong", "b"];

pub fn is_large_wrapper<N: DocumentNode>(node: &N) -> bool {
    node.child_count() >= LARGE_WRAPPER_CHILDREN
}

/// Find the smallest ancestor of `node` (or `node` itself) that looks like a post.
///
/// The first qualifying node below the wrapper size wins. Qualifying wrappers
/// are kept as a fallback unless they have a known non-post shape.
pub fn find_container<N: DocumentNode>(node: &N) -> Option<N> {
    let mut fallback: Option<N> = None;
    let mut current = Some(node.clone());
    let mut depth = 0;

    while let Some(candidate) = current {
        if depth > MAX_ANCESTOR_DEPTH || candidate.is_root() {
            break;
        }
        if qualifies(&candidate) {
            if !is_large_wrapper(&candidate) {
                return Some(candidate);
            }
            if fallback.is_none() && !is_non_post_shape(&candidate) {
                fallback = Some(candidate.clone());
            }
        }
        current = candidate.parent();
        depth += 1;
    }

    fallback
}

fn qualifies<N: DocumentNode>(node: &N) -> bool {
    if node.child_count() < MIN_CHILDREN {
        return false;
    }
    let descendants = node.descendants();
    descendants.iter().any(|d| d.tag() == "a" && d.attr("href").is_some())
        && descendants.iter().any(|d| d.has_tag(AUTHOR_TAGS) && !d.trimmed_text().is_empty())
        && node.trimmed_text().chars().count() > MIN_TEXT_CHARS
}

/// Notification trays, chat lists, bookmark panels and brand-footer strips.
fn is_non_post_shape<N: DocumentNode>(node: &N) -> bool {
    if let Some(label) = node.attr("aria-label") {
        if rules::matches(TextClass::PanelLabel, label.trim()) {
            return true;
        }
    }

    let Some(first) = node.children().into_iter().next() else {
        return false;
    };
    let first_text = first.trimmed_text();
    if rules::matches(TextClass::NonPostPrefix, &first_text) {
        return true;
    }
    first_text.to_lowercase().matches("facebook").count() >= BRAND_REPEAT_LIMIT
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::DomTree;

    const POST: &str = r#"
        <div id="feed">
          <div id="post" class="x1">
            <h3><a href="/jane">Jane Doe</a></h3>
            <a href="/posts/1">2h</a>
            <div dir="auto"><span id="body">Hello world, this is my post today.</span></div>
          </div>
        </div>"#;

    #[test]
    fn finds_the_post_node() {
        let tree = DomTree::parse(POST);
        let body = tree.element_by_id("body").unwrap();
        let container = find_container(&body).unwrap();
        assert_eq!(container.attr("id").as_deref(), Some("post"));
    }

    #[test]
    fn no_container_without_link() {
        let tree = DomTree::parse(
            r#"<div><h3>Title</h3><p>one</p><p id="t">Some text that is long enough to count</p></div>"#,
        );
        let node = tree.element_by_id("t").unwrap();
        assert!(find_container(&node).is_none());
    }

    #[test]
    fn notification_panel_wrapper_is_rejected() {
        let items: String = (0..12)
            .map(|i| format!(r#"<div><strong>Friend {i}</strong> <a href="/n/{i}">commented on your post</a></div>"#))
            .collect();
        let html = format!(r#"<div aria-label="Notifications" id="panel">{items}</div>"#);
        let tree = DomTree::parse(&html);
        let link = tree.element_by_id("panel").unwrap().descendants()[2].clone();
        assert!(find_container(&link).is_none());
    }

    #[test]
    fn plain_wrapper_is_a_fallback() {
        let items: String = (0..12)
            .map(|i| format!(r#"<p>line {i}</p>"#))
            .collect();
        let html = format!(
            r#"<div id="wrap"><h2>Author</h2><a href="/posts/9">link</a>{items}<span id="t">text</span></div>"#
        );
        let tree = DomTree::parse(&html);
        let node = tree.element_by_id("t").unwrap();
        let container = find_container(&node).unwrap();
        assert_eq!(container.attr("id").as_deref(), Some("wrap"));
    }
}

//! Viewer-identity detection.
//!
//! The viewer's own name leaks into captured text (composer, comment boxes),
//! so the normalizer redacts it. Detection tries three sources in order and
//! the first non-empty answer wins.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::dom::DocumentNode;

/// Where a detected name came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySource {
    ProfileControl,
    ComposerPlaceholder,
    PageMetadata,
}

static PROFILE_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:your profile|你的個人檔案|你的个人主页)").unwrap());

static COMPOSER_EN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)what['’]s on your mind,\s*([^?？]+?)\s*[?？]").unwrap());

static COMPOSER_ZH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(.+?)[，,]\s*(?:在想些什麼|你在想什麼|在想什么)").unwrap());

static METADATA_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""(?:viewer_name|viewerName|actorName)"\s*:\s*"((?:[^"\\]|\\.){1,100})""#).unwrap()
});

/// Resolve the viewer's display name from the document.
///
/// Returns `None` when no source yields a name; callers treat that as "no
/// redaction", never as an error.
pub fn detect_viewer_name<N: DocumentNode>(root: &N) -> Option<(String, IdentitySource)> {
    let elements = root.descendants();

    if let Some(name) = from_profile_control(&elements) {
        return Some((name, IdentitySource::ProfileControl));
    }
    if let Some(name) = from_composer(&elements) {
        return Some((name, IdentitySource::ComposerPlaceholder));
    }
    from_metadata(&elements).map(|name| (name, IdentitySource::PageMetadata))
}

fn from_profile_control<N: DocumentNode>(elements: &[N]) -> Option<String> {
    let control = elements.iter().find(|el| {
        el.attr("aria-label")
            .is_some_and(|label| PROFILE_LABEL.is_match(&label))
    })?;

    let from_image = std::iter::once(control.clone())
        .chain(control.descendants())
        .filter(|n| n.has_tag(&["img", "image"]))
        .filter_map(|n| n.attr("alt").or_else(|| n.attr("aria-label")))
        .map(|alt| alt.trim().to_string())
        .find(|alt| !alt.is_empty() && !PROFILE_LABEL.is_match(alt));
    if from_image.is_some() {
        return from_image;
    }

    let inner = control.trimmed_text();
    let inner = inner.lines().next().unwrap_or_default().trim();
    (!inner.is_empty() && !PROFILE_LABEL.is_match(inner)).then(|| inner.to_string())
}

fn from_composer<N: DocumentNode>(elements: &[N]) -> Option<String> {
    elements.iter().find_map(|el| {
        let candidates = [
            el.attr("placeholder"),
            el.attr("aria-placeholder"),
            el.attr("aria-label"),
            (el.child_count() == 0).then(|| el.trimmed_text()),
        ];
        candidates.into_iter().flatten().find_map(|text| composer_name(&text))
    })
}

fn composer_name(text: &str) -> Option<String> {
    let caps = COMPOSER_EN.captures(text).or_else(|| COMPOSER_ZH.captures(text))?;
    let name = caps.get(1)?.as_str().trim();
    (!name.is_empty()).then(|| name.to_string())
}

/// Metadata lives in script bodies, which only [`DocumentNode::raw_text`] sees.
fn from_metadata<N: DocumentNode>(elements: &[N]) -> Option<String> {
    elements
        .iter()
        .filter(|el| el.tag() == "script")
        .find_map(|el| {
            let raw = el.raw_text();
            let caps = METADATA_NAME.captures(&raw)?;
            let escaped = caps.get(1)?.as_str();
            let name = match serde_json::from_str::<String>(&format!("\"{escaped}\"")) {
                Ok(name) => name,
                Err(e) => {
                    debug!(error = %e, "Viewer name in metadata is not valid JSON, using it raw");
                    escaped.to_string()
                }
            };
            let name = name.trim();
            (!name.is_empty()).then(|| name.to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::DomTree;

    #[test]
    fn profile_control_image_alt() {
        let tree = DomTree::parse(
            r#"<body><a aria-label="Your profile" href="/me"><img alt="Jane Doe" src="x.jpg"></a></body>"#,
        );
        assert_eq!(
            detect_viewer_name(&tree.body()),
            Some(("Jane Doe".to_string(), IdentitySource::ProfileControl))
        );
    }

    #[test]
    fn composer_placeholder() {
        let tree = DomTree::parse(
            r#"<body><div role="button"><span>What's on your mind, Jane?</span></div></body>"#,
        );
        assert_eq!(
            detect_viewer_name(&tree.body()),
            Some(("Jane".to_string(), IdentitySource::ComposerPlaceholder))
        );
    }

    #[test]
    fn chinese_composer_placeholder() {
        let tree = DomTree::parse(r#"<body><span>王小明，在想些什麼？</span></body>"#);
        assert_eq!(detect_viewer_name(&tree.body()).map(|(n, _)| n).as_deref(), Some("王小明"));
    }

    #[test]
    fn script_metadata() {
        let tree = DomTree::parse(
            r#"<html><head><script>{"viewer":{"actorName":"Jane Doe"}}</script></head><body><p>hi</p></body></html>"#,
        );
        let root = tree.body().parent().unwrap();
        assert_eq!(
            detect_viewer_name(&root),
            Some(("Jane Doe".to_string(), IdentitySource::PageMetadata))
        );
    }

    #[test]
    fn nothing_found() {
        let tree = DomTree::parse("<body><p>Hello</p></body>");
        assert_eq!(detect_viewer_name(&tree.body()), None);
    }
}

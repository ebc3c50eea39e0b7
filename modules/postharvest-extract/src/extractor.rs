//! Field extraction from a located container.
//!
//! Every field extractor is independent and returns an empty value when it
//! finds nothing. One field failing never blocks another.

use chrono::Utc;
use postharvest_common::Record;
use url::Url;

use crate::dom::DocumentNode;
use crate::normalize::normalize_container;
use crate::rules::{self, TextClass};

/// Base for resolving relative links.
pub const SITE_ORIGIN: &str = "https://www.facebook.com";

/// Query keys that identify a post and survive permalink normalization.
const IDENTITY_QUERY_KEYS: &[&str] = &["story_fbid", "fbid", "id", "v"];

const MAX_DATE_TEXT_CHARS: usize = 50;
const MAX_AUTHOR_CHARS: usize = 100;
const MIN_IMAGE_PX: u32 = 50;

const THUMBNAIL_MARKERS: &[&str] = &["/p50x50/", "/p40x40/", "/p36x36/", "p50x50", "p40x40", "p36x36"];
const ICON_MARKERS: &[&str] = &["/emoji", "/reaction", "/rsrc.php"];
const PROXY_MARKERS: &[&str] = &["safe_image.php", "external.", "/preview/"];
const CDN_MARKERS: &[&str] = &["scontent", "fbcdn.net"];

/// Build a record from a container. Text goes through the normalizer with the
/// viewer's name redacted when one is known.
pub fn extract_record<N: DocumentNode>(container: &N, viewer_name: Option<&str>) -> Record {
    let (timestamp, permalink) = extract_timestamp(container);
    Record {
        author: extract_author(container),
        text: normalize_container(container, viewer_name),
        timestamp,
        permalink,
        reactions_label: extract_reactions(container),
        comments_label: extract_comments(container),
        images: extract_images(container),
        videos: extract_videos(container),
        local_files: Vec::new(),
        captured_at: Utc::now(),
    }
}

/// First non-trivial heading, else first non-trivial emphasized text.
pub fn extract_author<N: DocumentNode>(container: &N) -> String {
    let elements = container.descendants();
    first_short_text(&elements, &["h1", "h2", "h3", "h4", "h5", "h6"])
        .or_else(|| first_short_text(&elements, &["strong", "b"]))
        .unwrap_or_default()
}

fn first_short_text<N: DocumentNode>(elements: &[N], tags: &[&str]) -> Option<String> {
    elements
        .iter()
        .filter(|el| el.has_tag(tags))
        .filter_map(|el| el.trimmed_text().lines().next().map(|l| l.trim().to_string()))
        .find(|text| {
            let len = text.chars().count();
            len > 1 && len < MAX_AUTHOR_CHARS
        })
}

/// Timestamp text and permalink, tried in order:
///
/// 1. a post-shaped link whose text or label looks like a date
/// 2. any link whose text looks like a date
/// 3. an element whose label spells out a full date
/// 4. any span with date-like text
/// 5. a post-shaped link with no date
/// 6. a legacy `abbr` time element
///
/// The first post-shaped link found anywhere supplies the permalink when the
/// winning step does not carry one.
pub fn extract_timestamp<N: DocumentNode>(container: &N) -> (String, Option<String>) {
    let elements = container.descendants();
    let links: Vec<(&N, String)> = elements
        .iter()
        .filter(|el| el.tag() == "a")
        .filter_map(|el| el.attr("href").map(|href| (el, href)))
        .collect();
    let fallback_permalink = || {
        links
            .iter()
            .find(|(_, href)| is_post_href(href))
            .and_then(|(_, href)| normalize_permalink(href))
    };

    for (link, href) in &links {
        if !is_post_href(href) {
            continue;
        }
        let label = link.attr("aria-label").unwrap_or_default();
        let text = link.trimmed_text();
        if let Some(date) = [text, label].into_iter().find(|t| looks_like_date(t)) {
            return (date, normalize_permalink(href));
        }
    }

    if let Some((link, href)) = links.iter().find(|(link, _)| looks_like_date(&link.trimmed_text())) {
        let permalink = if is_post_href(href) {
            normalize_permalink(href)
        } else {
            fallback_permalink()
        };
        return (link.trimmed_text(), permalink);
    }

    if let Some(label) = elements
        .iter()
        .filter_map(|el| el.attr("aria-label"))
        .find(|label| rules::matches(TextClass::FullDateLabel, label))
    {
        return (label.trim().to_string(), fallback_permalink());
    }

    if let Some(date) = elements
        .iter()
        .filter(|el| el.tag() == "span")
        .map(|el| el.trimmed_text())
        .find(|text| looks_like_date(text))
    {
        return (date, fallback_permalink());
    }

    if let Some((link, href)) = links.iter().find(|(_, href)| is_post_href(href)) {
        let text = link.trimmed_text();
        let timestamp = if text.chars().count() < MAX_DATE_TEXT_CHARS {
            text
        } else {
            String::new()
        };
        return (timestamp, normalize_permalink(href));
    }

    if let Some(abbr) = elements.iter().find(|el| el.tag() == "abbr") {
        let text = abbr.trimmed_text();
        let text = if text.is_empty() {
            abbr.attr("title").unwrap_or_default()
        } else {
            text
        };
        return (text, None);
    }

    (String::new(), None)
}

fn looks_like_date(text: &str) -> bool {
    let text = text.trim();
    !text.is_empty()
        && text.chars().count() < MAX_DATE_TEXT_CHARS
        && rules::matches(TextClass::DateText, text)
}

/// First accessible label that names a reaction and carries a count.
pub fn extract_reactions<N: DocumentNode>(container: &N) -> String {
    container
        .descendants()
        .iter()
        .filter_map(|el| el.attr("aria-label"))
        .find(|label| {
            label.chars().any(|c| c.is_ascii_digit()) && rules::matches(TextClass::ReactionTerm, label)
        })
        .unwrap_or_default()
}

/// A span reading "N comments" in any supported locale.
pub fn extract_comments<N: DocumentNode>(container: &N) -> String {
    container
        .descendants()
        .iter()
        .filter(|el| el.tag() == "span")
        .map(|el| el.trimmed_text())
        .find(|text| rules::matches(TextClass::CommentCount, text))
        .unwrap_or_default()
}

/// Content images served from the CDN, in document order, without icons,
/// thumbnails or proxied previews.
pub fn extract_images<N: DocumentNode>(container: &N) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    for img in container.find_all(|el| el.tag() == "img") {
        let Some(src) = img.attr("src").map(|s| s.trim().to_string()) else {
            continue;
        };
        if src.is_empty() || src.starts_with("data:") {
            continue;
        }
        let dimension = |name: &str| img.attr(name).and_then(|v| v.trim().parse::<u32>().ok());
        if let (Some(w), Some(h)) = (dimension("width"), dimension("height")) {
            if w < MIN_IMAGE_PX && h < MIN_IMAGE_PX {
                continue;
            }
        }
        let excluded = ICON_MARKERS
            .iter()
            .chain(THUMBNAIL_MARKERS)
            .chain(PROXY_MARKERS)
            .any(|m| src.contains(m));
        if excluded || !CDN_MARKERS.iter().any(|m| src.contains(m)) {
            continue;
        }
        if !urls.contains(&src) {
            urls.push(src);
        }
    }
    urls
}

/// Direct video sources (minus blob/data URIs), then links to video pages.
pub fn extract_videos<N: DocumentNode>(container: &N) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    let mut push = |url: String| {
        if !urls.contains(&url) {
            urls.push(url);
        }
    };

    for video in container.find_all(|el| el.tag() == "video") {
        let sources = std::iter::once(video.clone())
            .chain(video.find_all(|el| el.tag() == "source"))
            .filter_map(|el| el.attr("src"));
        for src in sources {
            let src = src.trim();
            if !src.is_empty() && !src.starts_with("blob:") && !src.starts_with("data:") {
                push(src.to_string());
            }
        }
    }

    for link in container.find_all(|el| el.tag() == "a") {
        let Some(href) = link.attr("href") else { continue };
        if is_video_page_href(&href) {
            if let Some(url) = normalize_permalink(&href) {
                push(url);
            }
        }
    }

    urls
}

/// Controls that expand truncated content ("See more" and localized forms).
/// Nested matches collapse to the outermost control.
pub fn find_expansion_controls<N: DocumentNode>(container: &N) -> Vec<N> {
    let matches: Vec<N> = container.find_all(|el| {
        let clickable = el.has_tag(&["button", "a"])
            || el.attr("role").as_deref() == Some("button")
            || el.attr("tabindex").is_some();
        clickable && rules::matches(TextClass::ExpansionControl, &el.trimmed_text())
    });
    matches
        .iter()
        .filter(|el| !matches.iter().any(|other| other.key() != el.key() && el.is_descendant_of(other)))
        .cloned()
        .collect()
}

/// Hrefs shaped like a post, photo, video or permalink page.
pub fn is_post_href(href: &str) -> bool {
    ["/posts/", "/permalink/", "permalink.php", "story_fbid", "/photos/", "/photo/", "/videos/", "/reel/"]
        .iter()
        .any(|shape| href.contains(shape))
        || is_watch_href(href)
}

pub fn is_video_page_href(href: &str) -> bool {
    href.contains("/videos/") || href.contains("/reel/") || is_watch_href(href)
}

fn is_watch_href(href: &str) -> bool {
    href.contains("/watch") && href.contains("v=")
}

/// Resolve `href` against the site origin, dropping the fragment and every
/// query parameter except the ones that identify the post.
pub fn normalize_permalink(href: &str) -> Option<String> {
    let base = Url::parse(SITE_ORIGIN).ok()?;
    let mut url = base.join(href.trim()).ok()?;
    url.set_fragment(None);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| IDENTITY_QUERY_KEYS.contains(&k.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    url.set_query(None);
    if !kept.is_empty() {
        url.query_pairs_mut().extend_pairs(kept);
    }
    Some(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::DomTree;

    fn container(html: &str) -> crate::tree::DomNode {
        let tree = DomTree::parse(&format!("<body><div id='c'>{html}</div></body>"));
        tree.element_by_id("c").unwrap()
    }

    #[test]
    fn author_prefers_heading_over_strong() {
        let c = container("<strong>Someone Else</strong><h3><a href='/jane'>Jane Doe</a></h3>");
        assert_eq!(extract_author(&c), "Jane Doe");
        let c = container("<strong>X</strong><b>Pat Lee</b>");
        assert_eq!(extract_author(&c), "Pat Lee");
    }

    #[test]
    fn timestamp_from_post_link() {
        let c = container(
            "<a href='/jane/posts/123?__cft__=abc#x'>3h</a><a href='/other'>Yesterday</a>",
        );
        let (ts, link) = extract_timestamp(&c);
        assert_eq!(ts, "3h");
        assert_eq!(link.as_deref(), Some("https://www.facebook.com/jane/posts/123"));
    }

    #[test]
    fn permalink_keeps_identity_query_keys() {
        assert_eq!(
            normalize_permalink("/permalink.php?story_fbid=42&id=7&__tn__=R").as_deref(),
            Some("https://www.facebook.com/permalink.php?story_fbid=42&id=7")
        );
        assert_eq!(
            normalize_permalink("https://www.facebook.com/watch/?v=99&ref=feed").as_deref(),
            Some("https://www.facebook.com/watch/?v=99")
        );
    }

    #[test]
    fn timestamp_from_full_date_label_then_abbr() {
        let c = container("<span aria-label='Monday, March 3, 2024 at 4:15 PM'>·</span>");
        assert_eq!(extract_timestamp(&c).0, "Monday, March 3, 2024 at 4:15 PM");
        let c = container("<abbr title='Mar 3'>Mar 3 legacy</abbr>");
        assert_eq!(extract_timestamp(&c), ("Mar 3 legacy".to_string(), None));
    }

    #[test]
    fn permalink_without_date() {
        let c = container("<a href='/groups/1/permalink/55/'>View post</a>");
        let (ts, link) = extract_timestamp(&c);
        assert_eq!(ts, "View post");
        assert_eq!(link.as_deref(), Some("https://www.facebook.com/groups/1/permalink/55/"));
    }

    #[test]
    fn reactions_and_comments() {
        let c = container(
            "<div aria-label='Like'></div><div aria-label='All reactions: 12'></div><span>4 comments</span>",
        );
        assert_eq!(extract_reactions(&c), "All reactions: 12");
        assert_eq!(extract_comments(&c), "4 comments");
    }

    #[test]
    fn images_are_filtered() {
        let c = container(
            r#"<img src="https://scontent.xx.fbcdn.net/v/photo1.jpg">
               <img src="https://scontent.xx.fbcdn.net/v/photo1.jpg">
               <img src="https://scontent.xx.fbcdn.net/v/p50x50/face.jpg">
               <img src="https://static.xx.fbcdn.net/images/emoji.php/v9/smile.png">
               <img src="https://scontent.xx.fbcdn.net/v/icon.png" width="16" height="16">
               <img src="data:image/gif;base64,R0lGOD">
               <img src="https://example.com/other.jpg">"#,
        );
        assert_eq!(extract_images(&c), vec!["https://scontent.xx.fbcdn.net/v/photo1.jpg"]);
    }

    #[test]
    fn videos_direct_and_page_links() {
        let c = container(
            r#"<video src="blob:https://www.facebook.com/abc"><source src="https://video.xx.fbcdn.net/v/clip.mp4?sig=1"></video>
               <a href="/reel/777?s=share">reel</a>
               <a href="/reel/777">reel again</a>"#,
        );
        assert_eq!(
            extract_videos(&c),
            vec![
                "https://video.xx.fbcdn.net/v/clip.mp4?sig=1".to_string(),
                "https://www.facebook.com/reel/777".to_string(),
            ]
        );
    }

    #[test]
    fn expansion_controls_collapse_nested_matches() {
        let c = container(
            r#"<div dir="auto">Some text… <div role="button" tabindex="0"><span tabindex="-1">See more</span></div></div>"#,
        );
        let controls = find_expansion_controls(&c);
        assert_eq!(controls.len(), 1);
        assert_eq!(controls[0].attr("role").as_deref(), Some("button"));
    }

    #[test]
    fn record_fields_are_independent() {
        let c = container(
            r#"<h3>Jane Doe</h3><a href="/jane/posts/1">2h</a>
               <div dir="auto">Hello world, this is my post today.</div>"#,
        );
        let record = extract_record(&c, None);
        assert_eq!(record.author, "Jane Doe");
        assert_eq!(record.text, "Hello world, this is my post today.");
        assert_eq!(record.timestamp, "2h");
        assert!(record.images.is_empty());
        assert_eq!(record.reactions_label, "");
    }
}

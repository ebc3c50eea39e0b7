//! Expands a stored record into asset queue items.

use postharvest_common::{AssetKind, QueueItem, Record};
use url::Url;

const MEDIA_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "mp4", "mov", "webm", "m4v"];
const MAX_SLUG_CHARS: usize = 40;

/// One queue item per image and per direct video source, in asset order.
/// Links to video pages stay on the record but are not downloadable.
pub fn plan_assets(record_index: usize, record: &Record) -> Vec<QueueItem> {
    let slug = author_slug(&record.author);
    let images = record
        .images
        .iter()
        .enumerate()
        .map(|(i, url)| (i, AssetKind::Image, url));
    let videos = record
        .videos
        .iter()
        .enumerate()
        .map(|(j, url)| (record.images.len() + j, AssetKind::Video, url))
        .filter(|(_, _, url)| is_direct_media(url));

    images
        .chain(videos)
        .map(|(asset_index, kind, url)| {
            let destination = destination_path(record_index, &slug, asset_index, kind, url);
            QueueItem::pending(record_index, asset_index, kind, url.clone(), destination)
        })
        .collect()
}

/// `<record index>-<author slug>/<asset index>.<ext>`
pub fn destination_path(
    record_index: usize,
    slug: &str,
    asset_index: usize,
    kind: AssetKind,
    url: &str,
) -> String {
    let ext = media_extension(url).unwrap_or(match kind {
        AssetKind::Image => "jpg",
        AssetKind::Video => "mp4",
    });
    format!("{record_index:05}-{slug}/{asset_index:02}.{ext}")
}

/// Direct media lives off the main site; page links (reels, watch pages) do not.
pub fn is_direct_media(url: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed) => parsed
            .host_str()
            .is_some_and(|host| !(host == "facebook.com" || host.ends_with(".facebook.com"))),
        Err(_) => false,
    }
}

fn media_extension(url: &str) -> Option<&'static str> {
    let parsed = Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?;
    let (_, ext) = last.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    MEDIA_EXTENSIONS.iter().copied().find(|known| *known == ext)
}

/// Lowercase alphanumerics joined by single dashes.
pub fn author_slug(author: &str) -> String {
    let mut slug = String::new();
    for c in author.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            slug.push(c);
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
        if slug.chars().count() >= MAX_SLUG_CHARS {
            break;
        }
    }
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "unknown".to_string()
    } else {
        slug.to_string()
    }
}

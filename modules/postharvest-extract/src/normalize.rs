//! Text normalization for a located container.
//!
//! Collection gathers the container's text entries; [`clean_text`] then runs the
//! cleanup pipeline. Step order matters: the dedup steps at the end assume the
//! noise removed by the earlier ones is already gone.

use std::collections::HashSet;

use regex::Regex;

use crate::dom::DocumentNode;
use crate::rules::{self, TextClass};

/// Cap on stored text length, in characters.
pub const MAX_TEXT_CHARS: usize = 10_000;

/// Prefix marking text that was cut at [`MAX_TEXT_CHARS`].
pub const TRIMMED_MARKER: &str = "[content trimmed]";

/// Upper bound on pipeline passes when settling to a fixpoint.
const MAX_PASSES: usize = 4;

/// Collect and clean the text of a container in one go.
pub fn normalize_container<N: DocumentNode>(container: &N, viewer_name: Option<&str>) -> String {
    clean_text(&collect_text(container), viewer_name)
}

/// Join a container's text entries in document order.
///
/// Entries are the `dir="auto"` blocks the host uses for user text, falling
/// back to leaf elements when there are none. UI chrome is dropped and entries
/// that are substrings of a longer surviving entry are folded away.
pub fn collect_text<N: DocumentNode>(container: &N) -> String {
    let mut blocks: Vec<N> =
        container.find_all(|n| n.has_tag(&["div", "span"]) && n.attr("dir").as_deref() == Some("auto"));
    if blocks.is_empty() {
        blocks = container.find_all(|n| n.child_count() == 0);
    }

    let entries: Vec<String> = blocks
        .iter()
        .map(|n| n.trimmed_text())
        .filter(|t| !t.is_empty())
        .filter(|t| !rules::matches(TextClass::UiChrome, t))
        .collect();

    let mut seen = HashSet::new();
    entries
        .iter()
        .enumerate()
        .filter(|(i, entry)| {
            !entries
                .iter()
                .enumerate()
                .any(|(j, other)| j != *i && other.len() > entry.len() && other.contains(entry.as_str()))
        })
        .filter(|(_, entry)| seen.insert(entry.as_str()))
        .map(|(_, entry)| entry.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Run the cleanup pipeline until it stops changing its input.
///
/// Each pass applies the steps in order. Running to a fixpoint keeps the
/// function idempotent even when a late step (redaction) exposes a line an
/// early step would have removed. Over-long text is cut at a line boundary and
/// settled again, so the stored body is itself a fixpoint.
pub fn clean_text(text: &str, viewer_name: Option<&str>) -> String {
    let (body, mut trimmed) = strip_trim_marker(text);
    let mut current = settle(&body.replace("\r\n", "\n"), viewer_name);
    while current.chars().count() > MAX_TEXT_CHARS {
        current = settle(&cut_to_cap(&current), viewer_name);
        trimmed = true;
    }
    if trimmed {
        format!("{TRIMMED_MARKER}\n{current}")
    } else {
        current
    }
}

fn settle(text: &str, viewer_name: Option<&str>) -> String {
    let mut current = text.to_string();
    for _ in 0..MAX_PASSES {
        let next = clean_pass(&current, viewer_name);
        if next == current {
            break;
        }
        current = next;
    }
    current
}

fn clean_pass(text: &str, viewer_name: Option<&str>) -> String {
    let mut t = rules::strip_all(TextClass::TruncationMarker, text);
    t = drop_lines(&t, |line| rules::matches(TextClass::NavigationNoise, line));
    t = drop_lines(&t, is_obfuscated_label);
    t = drop_lines(&t, |line| rules::matches(TextClass::LinkPreviewNoise, line));
    t = strip_engagement_tail(&t);
    t = strip_trailing_counters(&t);
    if let Some(name) = viewer_name {
        t = redact_viewer_name(&t, name);
    }
    t = collapse_whitespace(&t);
    t = dedup_lines(&t);
    t = dedup_halves(&t);
    collapse_whitespace(&t).trim().to_string()
}

fn strip_trim_marker(text: &str) -> (&str, bool) {
    match text.trim_start().strip_prefix(TRIMMED_MARKER) {
        Some(rest) => (rest.trim_start(), true),
        None => (text, false),
    }
}

/// Keep at most [`MAX_TEXT_CHARS`], dropping a partially kept last line. A
/// single line longer than the cap is cut mid-line.
fn cut_to_cap(text: &str) -> String {
    let kept: String = text.chars().take(MAX_TEXT_CHARS).collect();
    match kept.rfind('\n') {
        Some(end) => kept[..end].trim_end().to_string(),
        None => kept.trim_end().to_string(),
    }
}

fn drop_lines<F: Fn(&str) -> bool>(text: &str, drop: F) -> String {
    text.lines()
        .filter(|line| {
            let trimmed = line.trim();
            trimmed.is_empty() || !drop(trimmed)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Sponsored labels are rendered as a long scrambled token of letters and digits.
fn is_obfuscated_label(line: &str) -> bool {
    line.chars().count() >= 15
        && line.chars().all(|c| c.is_ascii_alphanumeric())
        && line.chars().any(|c| c.is_ascii_digit())
        && line.chars().any(|c| c.is_ascii_alphabetic())
}

/// Cut from the first comment/share footer line to the end. The first line is
/// never treated as a footer.
fn strip_engagement_tail(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let cut = lines
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, line)| rules::matches(TextClass::EngagementTail, line.trim()))
        .map(|(i, _)| i);
    match cut {
        Some(i) => lines[..i].join("\n"),
        None => text.to_string(),
    }
}

fn strip_trailing_counters(text: &str) -> String {
    let mut lines: Vec<&str> = text.lines().collect();
    while let Some(last) = lines.last() {
        let trimmed = last.trim();
        let non_empty = lines.iter().filter(|l| !l.trim().is_empty()).count();
        if trimmed.is_empty() || (non_empty > 1 && rules::matches(TextClass::CounterLine, trimmed)) {
            lines.pop();
        } else {
            break;
        }
    }
    lines.join("\n")
}

/// Remove the viewer's own name: the full name anywhere (case-insensitive), and
/// each name part of two or more characters when it stands alone on a line.
pub fn redact_viewer_name(text: &str, name: &str) -> String {
    let name = name.trim();
    if name.is_empty() {
        return text.to_string();
    }

    let without_full = match Regex::new(&format!("(?i){}", regex::escape(name))) {
        Ok(re) => re.replace_all(text, "").into_owned(),
        Err(_) => text.to_string(),
    };

    let parts: Vec<String> = name
        .split_whitespace()
        .filter(|p| p.chars().count() >= 2)
        .map(str::to_lowercase)
        .collect();
    if parts.is_empty() {
        return without_full;
    }

    without_full
        .lines()
        .filter(|line| {
            let lowered = line.trim().to_lowercase();
            !parts.iter().any(|p| *p == lowered)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Trim each line, collapse runs of spaces, and fold runs of blank lines into one.
fn collapse_whitespace(text: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut blank_run = 0;
    for line in text.lines() {
        let squeezed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if squeezed.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push(squeezed);
    }
    out.join("\n")
}

/// Blank lines are exempt so paragraph breaks survive.
fn dedup_lines(text: &str) -> String {
    let mut seen = HashSet::new();
    text.lines()
        .filter(|line| {
            let trimmed = line.trim();
            trimmed.is_empty() || seen.insert(trimmed.to_string())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Collapse text that is one paragraph rendered twice (compact and expanded).
fn dedup_halves(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    for split in 1..lines.len() {
        let first = lines[..split].join("\n");
        let second = lines[split..].join("\n");
        let a = squash(&first);
        let b = squash(&second);
        if a.is_empty() || b.is_empty() {
            continue;
        }

        if a == b {
            return if first.matches('\n').count() >= second.matches('\n').count() {
                first
            } else {
                second
            };
        }

        let (shorter, longer, longer_raw) = if a.len() <= b.len() {
            (&a, &b, &second)
        } else {
            (&b, &a, &first)
        };
        if shorter.len() as f64 >= 0.6 * longer.len() as f64 && longer.contains(shorter.as_str()) {
            return longer_raw.clone();
        }
    }
    text.to_string()
}

fn squash(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_halves_collapse() {
        assert_eq!(clean_text("Great day!\nGreat day!", None), "Great day!");
    }

    #[test]
    fn rewrapped_halves_collapse_to_the_one_with_more_breaks() {
        let text = "Great day at the lake\nwith friends\nGreat day at the lake with friends";
        assert_eq!(clean_text(text, None), "Great day at the lake\nwith friends");
    }

    #[test]
    fn contained_half_keeps_the_longer() {
        let text = "We went hiking\nin the hills\nWe went hiking in the hills today";
        assert_eq!(clean_text(text, None), "We went hiking in the hills today");
    }

    #[test]
    fn truncation_marker_is_removed() {
        assert_eq!(clean_text("Big news… See more", None), "Big news");
        assert_eq!(clean_text("First line\nSee more", None), "First line");
    }

    #[test]
    fn engagement_tail_is_cut() {
        let text = "My post body\n12 comments\nNice!\nReply";
        assert_eq!(clean_text(text, None), "My post body");
    }

    #[test]
    fn trailing_counters_are_dropped() {
        assert_eq!(clean_text("Sunset tonight\n42\n1.2K", None), "Sunset tonight");
        assert_eq!(clean_text("2024", None), "2024");
    }

    #[test]
    fn obfuscated_and_domain_lines_are_dropped() {
        let text = "Buy now\nS8pon4sor3edXq7Zr2\nexample.com\nm.me/shop\nGreat deal";
        assert_eq!(clean_text(text, None), "Buy now\nGreat deal");
    }

    #[test]
    fn viewer_name_is_redacted() {
        let text = "Jane Doe shared a memory\nJane\nJaneway is a captain";
        assert_eq!(
            clean_text(text, Some("Jane Doe")),
            "shared a memory\nJaneway is a captain"
        );
    }

    #[test]
    fn blank_runs_collapse_to_one() {
        assert_eq!(clean_text("a\n\n\n\nb   c", None), "a\n\nb c");
    }

    #[test]
    fn long_text_is_capped_with_marker() {
        let text = "x ".repeat(MAX_TEXT_CHARS);
        let cleaned = clean_text(&text, None);
        assert!(cleaned.starts_with(TRIMMED_MARKER));
        assert_eq!(clean_text(&cleaned, None), cleaned);
    }

    #[test]
    fn cap_drops_the_partially_kept_line() {
        let text = format!("{}\n1234567 apples grew today", "word ".repeat(1999));
        let cleaned = clean_text(&text, None);
        assert!(cleaned.starts_with(TRIMMED_MARKER));
        assert!(!cleaned.contains("1234"));
        assert!(cleaned.ends_with("word word"));
    }

    #[test]
    fn idempotent_across_pipeline_paths() {
        let long_words = format!("{}\n1234567 apples grew today", "word ".repeat(1999));
        let long_lines = "Morning walk by the lake\n".repeat(500)
            + &(0..120)
                .map(|i| format!("note {i} about 1234567 apples picked along the orchard rows before the first frost came in\n"))
                .collect::<String>();
        let single_line = "a".repeat(MAX_TEXT_CHARS + 50) + " 42";
        let cases: Vec<(&str, String, Option<&str>)> = vec![
            (
                "noisy",
                "Facebook\nJane Doe\nHello there… See more\nHello there friends\n\n\n\n5 comments\nLike".to_string(),
                Some("Jane Doe"),
            ),
            ("capped mid-line", long_words, None),
            ("capped many lines", long_lines, None),
            ("capped single line", single_line, None),
            (
                "redaction exposes a counter",
                "Trail cleanup on Saturday\nJane Doe 12".to_string(),
                Some("Jane Doe"),
            ),
            (
                "redaction exposes a duplicate",
                "Bring gloves\nJane Doe Bring gloves\nSee you there".to_string(),
                Some("Jane Doe"),
            ),
            (
                "duplicated halves",
                "The library opens late today\nbecause of the storm\nThe library opens late today because of the storm".to_string(),
                None,
            ),
        ];

        for (name, input, viewer) in cases {
            let once = clean_text(&input, viewer);
            assert!(
                once.chars().count() <= MAX_TEXT_CHARS + TRIMMED_MARKER.len() + 1,
                "{name}: over cap"
            );
            assert_eq!(clean_text(&once, viewer), once, "{name}: not idempotent");
        }
    }
}

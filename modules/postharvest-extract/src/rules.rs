//! Locale rule tables for text classification.
//!
//! Each row maps a pattern to a classification. Control flow asks "does this
//! text match any rule of class X", so adding a locale means adding rows here.
//! All patterns are compiled case-insensitive.

use std::sync::LazyLock;

use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextClass {
    /// A text entry that is UI copy, dropped before joining.
    UiChrome,
    /// Label of a control that expands truncated content.
    ExpansionControl,
    /// Truncation marker left behind in the content stream.
    TruncationMarker,
    /// A whole line of leaked brand or navigation copy.
    NavigationNoise,
    /// Bare short-domain or messenger-link line left by a link preview.
    LinkPreviewNoise,
    /// A line that starts the comment/share footer; everything after it goes.
    EngagementTail,
    /// A bare reaction/comment counter line.
    CounterLine,
    /// Container text that opens like a notification or settings panel.
    NonPostPrefix,
    /// Text anywhere in the container that only notification panels carry.
    NotificationPanel,
    /// A standalone unread marker line.
    UnreadMarker,
    /// First line of a sidebar section.
    SidebarLabel,
    /// "N likes · M followers" page-card signature.
    FollowerSignature,
    /// Accessible label of a non-post panel (notifications, chats, bookmarks).
    PanelLabel,
    /// Accessible label term naming a reaction.
    ReactionTerm,
    /// "N comments" summary text.
    CommentCount,
    /// Relative or absolute date text as shown next to a post.
    DateText,
    /// Accessible label spelling out a full calendar date.
    FullDateLabel,
}

pub struct Rule {
    pub locale: &'static str,
    pub class: TextClass,
    pub pattern: Regex,
}

const MONTHS: &str = "january|february|march|april|may|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sep|sept|oct|nov|dec";
const WEEKDAYS: &str = "monday|tuesday|wednesday|thursday|friday|saturday|sunday";
const CLOCK: &str = r"\d{1,2}:\d{2}\s*(?:am|pm)?";

const RULE_TABLE: &[(&str, TextClass, &str)] = &[
    // --- UI chrome entries ---
    ("en", TextClass::UiChrome, r"^(?:like|comment|share|send|reply|see more|hide|follow|following|suggested for you|sponsored|·|…|\.\.\.|most relevant|all comments|top comments|see translation|edited)$"),
    ("en", TextClass::UiChrome, r"^(?:boost|insights|promote|advertise)\b"),
    ("en", TextClass::UiChrome, r"^(?:switch into|you['’]re commenting|manage|write a (?:public )?comment|boost this post|view insights)"),
    ("en", TextClass::UiChrome, r"^what['’]s on your mind"),
    ("zh", TextClass::UiChrome, r"^(?:讚|留言|分享|傳送|回覆|顯示更多|查看更多|展開|贊助|追蹤|為你推薦|最相關|查看翻譯)$"),
    ("zh", TextClass::UiChrome, r"^(?:加強推廣|洞察報告|推廣|切換為|撰寫留言)"),
    ("zh", TextClass::UiChrome, r"(?:在想些什麼|你在想什麼)"),
    // --- Expansion controls ---
    ("en", TextClass::ExpansionControl, r"^(?:…|\.\.\.)?\s*see more\s*…?$"),
    ("zh", TextClass::ExpansionControl, r"^(?:…|\.\.\.)?\s*(?:顯示更多|查看更多|展開)$"),
    // --- Truncation markers ---
    ("en", TextClass::TruncationMarker, r"(?:…|\.\.\.)\s*see more"),
    ("en", TextClass::TruncationMarker, r"(?m)^[ \t]*see more[ \t]*$"),
    ("en", TextClass::TruncationMarker, r"\s*\bsee more\s*\z"),
    ("zh", TextClass::TruncationMarker, r"(?:…|\.\.\.)?\s*(?:顯示更多|查看更多)"),
    ("zh", TextClass::TruncationMarker, r"(?m)^[ \t]*展開[ \t]*$"),
    // --- Navigation / brand noise lines ---
    ("en", TextClass::NavigationNoise, r"^(?:facebook|messenger|marketplace|notifications|menu|watch|reels|gaming|search facebook|create)$"),
    ("zh", TextClass::NavigationNoise, r"^(?:首頁|通知|功能表|市集|影片|搜尋 facebook)$"),
    // --- Link preview leftovers ---
    ("*", TextClass::LinkPreviewNoise, r"^m\.me(?:/\S*)?$"),
    ("*", TextClass::LinkPreviewNoise, r"^(?:www\.)?[a-z0-9-]+(?:\.[a-z0-9-]+)*\.[a-z]{2,6}$"),
    // --- Comment / share footer ---
    ("en", TextClass::EngagementTail, r"^\d[\d.,]*\s*[km]?\s*(?:comments?|shares?)$"),
    ("en", TextClass::EngagementTail, r"^view (?:\d+ )?more (?:comments?|replies)$"),
    ("en", TextClass::EngagementTail, r"^photos from .+['’]s post$"),
    ("en", TextClass::EngagementTail, r"^all reactions:?$"),
    ("zh", TextClass::EngagementTail, r"^\d[\d.,]*\s*[萬千]?\s*(?:則留言|條留言|次分享)$"),
    ("zh", TextClass::EngagementTail, r"^(?:查看更多留言|所有心情：?)$"),
    ("*", TextClass::CounterLine, r"^\d[\d.,]*\s*[km萬千]?$"),
    // --- Non-post containers ---
    ("en", TextClass::NonPostPrefix, r"^(?:your push notifications|turn on notifications|not now|new\s+see all|notifications\s*\n)"),
    ("zh", TextClass::NonPostPrefix, r"^(?:你的推播通知|開啟通知|稍後再說)"),
    ("en", TextClass::NotificationPanel, r"(?:mark all as read|notification settings|turn on push notifications|earlier\s*\nsee all)"),
    ("zh", TextClass::NotificationPanel, r"(?:全部標示為已讀|通知設定)"),
    ("en", TextClass::UnreadMarker, r"^unread$"),
    ("zh", TextClass::UnreadMarker, r"^未讀$"),
    ("en", TextClass::SidebarLabel, r"^(?:contacts|your shortcuts|shortcuts|group conversations|birthdays|sponsored|trending|friend requests|your pages and profiles|explore|community chats)$"),
    ("zh", TextClass::SidebarLabel, r"^(?:聯絡人|你的捷徑|捷徑|群組對話|生日|贊助|交友邀請)$"),
    ("en", TextClass::FollowerSignature, r"\d[\d.,]*\s*[km]?\s+likes?\s*[·•]\s*\d[\d.,]*\s*[km]?\s+followers?"),
    ("zh", TextClass::FollowerSignature, r"\d[\d.,]*\s*[萬千]?\s*人說讚\s*[·•]\s*\d[\d.,]*\s*[萬千]?\s*位追蹤者"),
    ("en", TextClass::PanelLabel, r"^(?:notifications|chats|messenger|bookmarks|shortcuts|contacts|account controls and settings|your profile)$"),
    ("zh", TextClass::PanelLabel, r"^(?:通知|聊天室|書籤|捷徑|聯絡人)$"),
    // --- Field extraction ---
    ("en", TextClass::ReactionTerm, r"\b(?:reactions?|likes?|love|haha|wow|sad|angry|care)\b"),
    ("zh", TextClass::ReactionTerm, r"(?:心情|讚|大心|哈|哇|嗚|怒)"),
    ("en", TextClass::CommentCount, r"^\d[\d.,]*\s*[km]?\s*comments?$"),
    ("zh", TextClass::CommentCount, r"^\d[\d.,]*\s*[萬千]?\s*(?:則留言|條留言)$"),
];

static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    let mut rules: Vec<Rule> = RULE_TABLE
        .iter()
        .map(|(locale, class, pattern)| compile(locale, *class, pattern))
        .collect();
    rules.extend(date_rules());
    rules
});

fn compile(locale: &'static str, class: TextClass, pattern: &str) -> Rule {
    Rule {
        locale,
        class,
        pattern: Regex::new(&format!("(?i){pattern}")).expect("valid rule pattern"),
    }
}

/// Date rows are assembled from month/weekday vocabularies.
fn date_rules() -> Vec<Rule> {
    let relative_en = r"^(?:just now|now|yesterday(?: at .+)?|\d+\s*(?:s|secs?|seconds?|m|mins?|minutes?|h|hrs?|hours?|d|days?|w|wks?|weeks?|y|yrs?|years?)(?: ago)?)$".to_string();
    let absolute_en = format!(
        r"^(?:(?:{WEEKDAYS}),?\s+)?(?:{MONTHS})\.?\s+\d{{1,2}}(?:,?\s+\d{{4}})?(?:\s+at\s+{CLOCK})?$"
    );
    let day_first_en = format!(
        r"^\d{{1,2}}\s+(?:{MONTHS})\.?(?:\s+\d{{4}})?(?:\s+at\s+{CLOCK})?$"
    );
    let full_en = format!(
        r"(?:(?:{WEEKDAYS}),?\s+)?(?:{MONTHS})\s+\d{{1,2}},?\s+\d{{4}}|\d{{1,2}}\s+(?:{MONTHS})\s+\d{{4}}"
    );
    let relative_zh = r"^(?:剛剛|昨天.*|\d+\s*(?:秒|分鐘|小時|天|週|年)(?:前)?)$".to_string();
    let absolute_zh = r"^(?:\d{4}年)?\d{1,2}月\d{1,2}日.*$".to_string();
    let full_zh = r"\d{4}年\d{1,2}月\d{1,2}日".to_string();

    vec![
        compile("en", TextClass::DateText, &relative_en),
        compile("en", TextClass::DateText, &absolute_en),
        compile("en", TextClass::DateText, &day_first_en),
        compile("zh", TextClass::DateText, &relative_zh),
        compile("zh", TextClass::DateText, &absolute_zh),
        compile("en", TextClass::FullDateLabel, &full_en),
        compile("zh", TextClass::FullDateLabel, &full_zh),
    ]
}

/// Rules of one class, in table order.
pub fn rules(class: TextClass) -> impl Iterator<Item = &'static Rule> {
    RULES.iter().filter(move |r| r.class == class)
}

/// Whether any rule of `class` matches `text`.
pub fn matches(class: TextClass, text: &str) -> bool {
    rules(class).any(|r| r.pattern.is_match(text))
}

/// Remove every match of every rule of `class`.
pub fn strip_all(class: TextClass, text: &str) -> String {
    rules(class).fold(text.to_string(), |acc, rule| {
        rule.pattern.replace_all(&acc, "").into_owned()
    })
}

/// Locales present in the table.
pub fn locales() -> Vec<&'static str> {
    let mut out: Vec<&'static str> = Vec::new();
    for rule in RULES.iter() {
        if !out.contains(&rule.locale) {
            out.push(rule.locale);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_pattern_compiles() {
        assert!(RULES.len() > RULE_TABLE.len());
        assert_eq!(locales(), vec!["en", "zh", "*"]);
    }

    #[test]
    fn ui_chrome_is_case_insensitive() {
        assert!(matches(TextClass::UiChrome, "Like"));
        assert!(matches(TextClass::UiChrome, "Boost this post"));
        assert!(matches(TextClass::UiChrome, "分享"));
        assert!(!matches(TextClass::UiChrome, "I like this"));
    }

    #[test]
    fn dates_relative_and_absolute() {
        for text in ["2h", "5 mins", "Just now", "Yesterday at 3:15 PM", "March 3 at 4:15 PM", "March 3, 2024", "3 March", "3小時", "2024年3月3日"] {
            assert!(matches(TextClass::DateText, text), "{text} should look like a date");
        }
        for text in ["Hello there", "2 comments", "Maybe"] {
            assert!(!matches(TextClass::DateText, text), "{text} should not look like a date");
        }
    }

    #[test]
    fn full_date_label() {
        assert!(matches(TextClass::FullDateLabel, "Monday, March 3, 2024 at 4:15 PM"));
        assert!(!matches(TextClass::FullDateLabel, "3h"));
    }

    #[test]
    fn truncation_marker_inside_prose_survives() {
        let text = "I want to see more of this city\nNice";
        assert_eq!(strip_all(TextClass::TruncationMarker, text), text);
        assert_eq!(strip_all(TextClass::TruncationMarker, "Great news… See more"), "Great news");
    }

    #[test]
    fn comment_counts() {
        assert!(matches(TextClass::CommentCount, "12 comments"));
        assert!(matches(TextClass::CommentCount, "1.2K Comments"));
        assert!(matches(TextClass::CommentCount, "5 則留言"));
        assert!(!matches(TextClass::CommentCount, "comments are closed"));
    }

    #[test]
    fn follower_signature() {
        assert!(matches(TextClass::FollowerSignature, "Page · 1.2K likes · 3K followers"));
    }
}

// src/bot/rules.rs - Pure content-policy evaluation over messages and settings

use anyhow::{Context, Result};
use regex::Regex;

use crate::types::{FilterKind, GroupSettings, IncomingMessage, MessageKind};

/// Text shapes that hang or flood clients. Any single match means spam.
const HANG_PATTERNS: [&str; 4] = [
    // "22." repeated 15+ times
    r"(22\.){15,}",
    // 8+ dot-separated 1-3 digit groups (numeric flood)
    r"(\d{1,3}\.){8,}",
    // 8+ consecutive clusters of 4+ non-word/non-space characters
    r"([^\w\s]{4,}){8,}",
    // 30+ consecutive short whitespace-separated tokens. The boundaries keep
    // backtracking from chunking longer words into 1-3 char bites, which would
    // flag any ordinary sentence with 30+ letters.
    r"(\b\w{1,3}\b\s*){30,}",
];

/// Messages longer than this are deleted by the hygiene policy.
const MAX_TEXT_CHARS: usize = 1000;

/// Invisible characters used to smuggle junk past readers.
const HIDDEN_CHARS: [char; 2] = ['\u{200b}', '\u{feff}'];

/// Content-policy outcome for a single message, first match wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentViolation {
    /// Text contains a link; handling depends on strict mode.
    Link,
    /// Overlong text or hidden control characters.
    SuspiciousText,
    /// Message kind blocked by the corresponding filter flag.
    Filtered(FilterKind),
}

/// Stateless policy evaluation. Holds only the compiled hang patterns.
pub struct RuleEngine {
    hang_patterns: Vec<Regex>,
}

impl RuleEngine {
    pub fn new() -> Result<Self> {
        let hang_patterns = HANG_PATTERNS
            .iter()
            .map(|pattern| {
                Regex::new(pattern).with_context(|| format!("Invalid hang pattern: {}", pattern))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { hang_patterns })
    }

    /// Whether the text matches any hang/flood pattern.
    pub fn is_hang_message(&self, text: &str) -> bool {
        self.hang_patterns.iter().any(|pattern| pattern.is_match(text))
    }

    pub fn contains_link(text: &str) -> bool {
        text.contains("rubika.ir/") || text.contains("https://") || text.contains("http://")
    }

    /// Hygiene policy: overlong messages or hidden zero-width/BOM characters.
    pub fn is_suspicious_text(text: &str) -> bool {
        text.chars().count() > MAX_TEXT_CHARS || text.chars().any(|c| HIDDEN_CHARS.contains(&c))
    }

    /// Filter flag guarding a directly filterable media kind.
    fn media_filter(kind: MessageKind) -> Option<FilterKind> {
        match kind {
            MessageKind::Gif => Some(FilterKind::Gif),
            MessageKind::Image => Some(FilterKind::Photo),
            MessageKind::Voice => Some(FilterKind::Voice),
            MessageKind::Video => Some(FilterKind::Video),
            _ => None,
        }
    }

    /// Evaluate the content policy (link, hygiene, media/story/file filters)
    /// against current settings. Later rules are not evaluated once one matches.
    pub fn content_violation(
        msg: &IncomingMessage,
        settings: &GroupSettings,
    ) -> Option<ContentViolation> {
        if msg.is_text() {
            if Self::contains_link(&msg.text) {
                return Some(ContentViolation::Link);
            }
            if Self::is_suspicious_text(&msg.text) {
                return Some(ContentViolation::SuspiciousText);
            }
            return None;
        }

        if let Some(kind) = Self::media_filter(msg.kind) {
            if settings.filters.get(kind) {
                return Some(ContentViolation::Filtered(kind));
            }
            return None;
        }

        if msg.kind == MessageKind::File {
            let (is_story, mime) = match &msg.file {
                Some(file) => (file.is_story, file.mime_type.as_str()),
                None => (false, ""),
            };

            if is_story && mime.contains("video") && settings.filters.story {
                return Some(ContentViolation::Filtered(FilterKind::Story));
            }
            if !is_story && settings.filters.other_files {
                return Some(ContentViolation::Filtered(FilterKind::OtherFiles));
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FileInfo;

    fn engine() -> RuleEngine {
        RuleEngine::new().unwrap()
    }

    fn text_message(text: &str) -> IncomingMessage {
        IncomingMessage {
            chat_guid: "g1".to_string(),
            sender_guid: "u1".to_string(),
            message_id: "m1".to_string(),
            kind: MessageKind::Text,
            text: text.to_string(),
            reply_to: None,
            file: None,
        }
    }

    fn media_message(kind: MessageKind, file: Option<FileInfo>) -> IncomingMessage {
        IncomingMessage {
            chat_guid: "g1".to_string(),
            sender_guid: "u1".to_string(),
            message_id: "m1".to_string(),
            kind,
            text: String::new(),
            reply_to: None,
            file,
        }
    }

    #[test]
    fn repeated_22_dot_is_hang() {
        assert!(engine().is_hang_message(&"22.".repeat(16)));
        assert!(!engine().is_hang_message(&"22.".repeat(5)));
    }

    #[test]
    fn numeric_flood_is_hang() {
        assert!(engine().is_hang_message("1.12.123.1.12.123.1.12."));
        assert!(!engine().is_hang_message("version 1.2.3"));
    }

    #[test]
    fn symbol_flood_is_hang() {
        assert!(engine().is_hang_message(&"#$%^".repeat(8)));
        assert!(!engine().is_hang_message("hello!!! :)"));
    }

    #[test]
    fn short_token_flood_is_hang() {
        let flood = "ab ".repeat(35);
        assert!(engine().is_hang_message(&flood));
        assert!(!engine().is_hang_message("two or so short words here"));
    }

    #[test]
    fn ordinary_text_is_not_hang() {
        assert!(!engine().is_hang_message("سلام، این یک پیام معمولی است for testing purposes"));
        // Plenty of word characters, but the longer words break the token chain.
        assert!(!engine().is_hang_message(
            "this perfectly reasonable sentence contains plenty of longer words without flooding"
        ));
    }

    #[test]
    fn link_detection() {
        assert!(RuleEngine::contains_link("see https://example.com"));
        assert!(RuleEngine::contains_link("http://x"));
        assert!(RuleEngine::contains_link("rubika.ir/g/abc"));
        assert!(!RuleEngine::contains_link("no links here"));
    }

    #[test]
    fn hygiene_flags_overlong_and_hidden_chars() {
        assert!(RuleEngine::is_suspicious_text(&"x".repeat(1001)));
        assert!(!RuleEngine::is_suspicious_text(&"x".repeat(1000)));
        assert!(RuleEngine::is_suspicious_text("hi\u{200b}there"));
        assert!(RuleEngine::is_suspicious_text("\u{feff}payload"));
        assert!(!RuleEngine::is_suspicious_text("plain text"));
    }

    #[test]
    fn link_wins_over_hygiene() {
        let long_link = format!("https://x/{}", "a".repeat(1200));
        let msg = text_message(&long_link);
        assert_eq!(
            RuleEngine::content_violation(&msg, &GroupSettings::default()),
            Some(ContentViolation::Link)
        );
    }

    #[test]
    fn media_filters_apply_only_when_enabled() {
        let mut settings = GroupSettings::default();
        let gif = media_message(MessageKind::Gif, None);

        assert_eq!(RuleEngine::content_violation(&gif, &settings), None);

        settings.filters.set(FilterKind::Gif, true);
        assert_eq!(
            RuleEngine::content_violation(&gif, &settings),
            Some(ContentViolation::Filtered(FilterKind::Gif))
        );

        settings.filters.set(FilterKind::Photo, true);
        let photo = media_message(MessageKind::Image, None);
        assert_eq!(
            RuleEngine::content_violation(&photo, &settings),
            Some(ContentViolation::Filtered(FilterKind::Photo))
        );
    }

    #[test]
    fn story_filter_requires_story_video_file() {
        let mut settings = GroupSettings::default();
        settings.filters.set(FilterKind::Story, true);

        let story = media_message(
            MessageKind::File,
            Some(FileInfo { mime_type: "video/mp4".to_string(), is_story: true }),
        );
        assert_eq!(
            RuleEngine::content_violation(&story, &settings),
            Some(ContentViolation::Filtered(FilterKind::Story))
        );

        // A story image is not caught by the story filter.
        let image_story = media_message(
            MessageKind::File,
            Some(FileInfo { mime_type: "image/png".to_string(), is_story: true }),
        );
        assert_eq!(RuleEngine::content_violation(&image_story, &settings), None);
    }

    #[test]
    fn other_files_filter_skips_stories() {
        let mut settings = GroupSettings::default();
        settings.filters.set(FilterKind::OtherFiles, true);

        let document = media_message(
            MessageKind::File,
            Some(FileInfo { mime_type: "application/pdf".to_string(), is_story: false }),
        );
        assert_eq!(
            RuleEngine::content_violation(&document, &settings),
            Some(ContentViolation::Filtered(FilterKind::OtherFiles))
        );

        let story = media_message(
            MessageKind::File,
            Some(FileInfo { mime_type: "video/mp4".to_string(), is_story: true }),
        );
        assert_eq!(RuleEngine::content_violation(&story, &settings), None);
    }
}

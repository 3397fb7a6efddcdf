//! Record normalizer
//!
//! Turns the raw fields scraped from a chat page into a canonical
//! [`Conversation`]: provider detection, title and summary cleanup, tag
//! suggestion and, in full capture mode, message conversion with ordering
//! and duplicate removal.

pub mod provider;

pub use provider::{detect_provider, host_from_url};

use crate::config::{CaptureConfig, CaptureMode};
use crate::convert;
use crate::error::{AgregError, Result};
use crate::model::{new_record_id, normalize_tags, Conversation, Message, Role};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Number of non-whitespace characters used in a message fingerprint
const FINGERPRINT_CHARS: usize = 50;

/// Punctuation replaced by spaces before tag tokenizing
const TAG_PUNCTUATION: &[char] = &[
    '.', ',', '/', '#', '!', '$', '%', '^', '&', '*', ';', ':', '{', '}', '=', '-', '_', '`', '~',
    '(', ')',
];

const STOP_WORDS: &[&str] = &[
    // French
    "le", "la", "les", "un", "une", "des", "ce", "cet", "cette", "ces", "de", "du", "à", "au",
    "aux", "en", "par", "pour", "sur", "dans", "et", "ou", "mais", "donc", "or", "ni", "car",
    "je", "tu", "il", "elle", "nous", "vous", "ils", "elles", "est", "sont", "avoir", "être",
    "faire", "dire", "aller", "comment", "pourquoi", "quand", "qui", "quoi", "quel", "quelle",
    "avec", "sans", "sous", "vers", "chez",
    // English
    "the", "and", "with", "about", "after", "before", "could", "would", "should", "their",
    "there", "these", "those", "which", "where", "while", "other", "using", "what", "when",
    "from", "into", "this", "that", "your", "have", "been", "being",
    // Generic
    "discussion", "conversation", "chat",
];

/// A message as scraped from the page, before conversion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedMessage {
    pub role: Role,
    /// Serialized markup of the message body
    pub html: String,
    /// Vertical page offset used to restore reading order
    #[serde(default)]
    pub offset_top: f64,
}

/// Raw fields captured from a chat page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCapture {
    pub url: String,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub llm: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    /// Explicit tag candidates (user-entered or prefilled)
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub messages: Vec<CapturedMessage>,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
}

/// Builds canonical records from raw captures
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    config: CaptureConfig,
}

impl Normalizer {
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }

    pub fn mode(&self) -> CaptureMode {
        self.config.mode
    }

    /// Normalizes a raw capture into a new record with a fresh id
    ///
    /// # Arguments
    ///
    /// * `raw` - Fields scraped from the page
    /// * `captured_at` - Capture time, also used for the fallback title date
    ///
    /// # Errors
    ///
    /// Returns `AgregError::Capture` when the capture has no url
    ///
    /// # Examples
    ///
    /// ```
    /// use agregllm::config::CaptureConfig;
    /// use agregllm::normalize::{Normalizer, RawCapture};
    /// use chrono::Utc;
    ///
    /// let normalizer = Normalizer::new(CaptureConfig::default());
    /// let raw = RawCapture {
    ///     url: "https://claude.ai/chat/42".to_string(),
    ///     title: "  Borrow checker tips ".to_string(),
    ///     ..Default::default()
    /// };
    /// let record = normalizer.normalize(raw, Utc::now()).unwrap();
    /// assert_eq!(record.llm_source, "Claude");
    /// assert_eq!(record.title, "Borrow checker tips");
    /// assert!(record.messages.is_empty());
    /// ```
    pub fn normalize(&self, raw: RawCapture, captured_at: DateTime<Utc>) -> Result<Conversation> {
        let url = raw.url.trim().to_string();
        if url.is_empty() {
            return Err(AgregError::Capture("capture has no url".to_string()).into());
        }

        let host = raw
            .host
            .clone()
            .filter(|h| !h.trim().is_empty())
            .or_else(|| host_from_url(&url))
            .unwrap_or_default();
        let llm = raw
            .llm
            .clone()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| detect_provider(&host));

        let title = self.clean_title(&raw.title, &llm, raw.date.unwrap_or(captured_at));
        let summary = self.clean_summary(raw.summary.as_deref());

        let messages = match self.config.mode {
            CaptureMode::MetadataOnly => Vec::new(),
            CaptureMode::Full => convert_messages(raw.messages),
        };

        let tags = if !raw.tags.is_empty() {
            normalize_tags(&raw.tags)
        } else if self.config.mode == CaptureMode::Full {
            let page_summary = raw.summary.as_deref().unwrap_or_default();
            self.suggest_tags(&title, page_summary)
        } else {
            Vec::new()
        };

        tracing::debug!(
            url = %url,
            llm = %llm,
            messages = messages.len(),
            tags = tags.len(),
            "Normalized capture"
        );

        Ok(Conversation {
            id: new_record_id(),
            title,
            url,
            llm_source: llm,
            captured_at,
            date: raw.date,
            summary,
            messages,
            tags,
            folder_id: None,
            is_favorite: false,
        })
    }

    /// Trims the title, substituting a dated fallback when it is empty or
    /// just repeats the provider name
    pub fn clean_title(&self, title: &str, llm: &str, date: DateTime<Utc>) -> String {
        let title = title.trim();
        if title.is_empty() || title.eq_ignore_ascii_case(llm) {
            return format!(
                "{} {} ({})",
                self.config.title_kind,
                llm,
                date.format("%Y-%m-%d")
            );
        }
        title.to_string()
    }

    /// Trims and truncates the summary to the configured character budget
    pub fn clean_summary(&self, summary: Option<&str>) -> String {
        let summary = summary.map(str::trim).unwrap_or_default();
        if summary.is_empty() {
            return self.config.no_preview_text.clone();
        }

        let limit = self.config.summary_max_chars;
        if summary.chars().count() > limit {
            let truncated: String = summary.chars().take(limit).collect();
            format!("{}...", truncated.trim_end())
        } else {
            summary.to_string()
        }
    }

    /// Suggests tags from the significant words of title and summary
    ///
    /// # Examples
    ///
    /// ```
    /// use agregllm::config::CaptureConfig;
    /// use agregllm::normalize::Normalizer;
    ///
    /// let normalizer = Normalizer::new(CaptureConfig::default());
    /// let tags = normalizer.suggest_tags("Rust async runtime", "Comparing tokio with async-std in 2024");
    /// assert_eq!(tags, vec!["async", "runtime", "comparing"]);
    /// ```
    pub fn suggest_tags(&self, title: &str, summary: &str) -> Vec<String> {
        let source: String = format!("{} {}", title, summary)
            .to_lowercase()
            .chars()
            .map(|c| if TAG_PUNCTUATION.contains(&c) { ' ' } else { c })
            .collect();

        let mut seen = HashSet::new();
        source
            .split_whitespace()
            .filter(|word| word.chars().count() >= self.config.tag_min_chars)
            .filter(|word| !word.chars().all(|c| c.is_ascii_digit()))
            .filter(|word| !STOP_WORDS.contains(word) && !provider::PROVIDER_WORDS.contains(word))
            .filter(|word| seen.insert(word.to_string()))
            .take(self.config.max_suggested_tags)
            .map(str::to_string)
            .collect()
    }
}

/// Restores page order, converts markup and drops empty or repeated
/// messages
pub fn convert_messages(mut captured: Vec<CapturedMessage>) -> Vec<Message> {
    captured.sort_by(|a, b| a.offset_top.total_cmp(&b.offset_top));

    let converted = captured.into_iter().filter_map(|msg| {
        let content = convert::html_to_markdown(&msg.html);
        if content.is_empty() {
            None
        } else {
            Some(Message::new(msg.role, content))
        }
    });
    dedup_messages(converted)
}

/// Keeps the first message of each `(role, leading text)` fingerprint
pub fn dedup_messages<I>(messages: I) -> Vec<Message>
where
    I: IntoIterator<Item = Message>,
{
    let mut seen: HashSet<(Role, String)> = HashSet::new();
    messages
        .into_iter()
        .filter(|msg| seen.insert(fingerprint(msg)))
        .collect()
}

fn fingerprint(msg: &Message) -> (Role, String) {
    let lead: String = msg
        .content
        .chars()
        .filter(|c| !c.is_whitespace())
        .take(FINGERPRINT_CHARS)
        .collect();
    (msg.role, lead)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 9, 30, 0).unwrap()
    }

    fn full_normalizer() -> Normalizer {
        Normalizer::new(CaptureConfig {
            mode: CaptureMode::Full,
            ..CaptureConfig::default()
        })
    }

    fn captured(role: Role, html: &str, offset_top: f64) -> CapturedMessage {
        CapturedMessage {
            role,
            html: html.to_string(),
            offset_top,
        }
    }

    #[test]
    fn test_missing_url_is_rejected() {
        let normalizer = Normalizer::default();
        let result = normalizer.normalize(RawCapture::default(), fixed_time());
        assert!(result.is_err());
    }

    #[test]
    fn test_title_fallback_when_empty() {
        let raw = RawCapture {
            url: "https://chatgpt.com/c/1".to_string(),
            title: "   ".to_string(),
            ..Default::default()
        };
        let record = Normalizer::default().normalize(raw, fixed_time()).unwrap();
        assert_eq!(record.title, "Discussion ChatGPT (2025-03-14)");
    }

    #[test]
    fn test_title_fallback_when_equal_to_provider() {
        let raw = RawCapture {
            url: "https://claude.ai/chat/1".to_string(),
            title: "claude".to_string(),
            ..Default::default()
        };
        let record = Normalizer::default().normalize(raw, fixed_time()).unwrap();
        assert_eq!(record.title, "Discussion Claude (2025-03-14)");
    }

    #[test]
    fn test_explicit_llm_and_host_take_precedence() {
        let raw = RawCapture {
            url: "https://example.org/x".to_string(),
            host: Some("chat.mistral.ai".to_string()),
            title: "t".to_string(),
            ..Default::default()
        };
        let record = Normalizer::default().normalize(raw.clone(), fixed_time()).unwrap();
        assert_eq!(record.llm_source, "Mistral");

        let raw = RawCapture {
            llm: Some("Custom".to_string()),
            ..raw
        };
        let record = Normalizer::default().normalize(raw, fixed_time()).unwrap();
        assert_eq!(record.llm_source, "Custom");
    }

    #[test]
    fn test_summary_placeholder_and_truncation() {
        let normalizer = Normalizer::default();
        assert_eq!(normalizer.clean_summary(None), "No preview available.");
        assert_eq!(normalizer.clean_summary(Some("  short  ")), "short");

        let long = "é".repeat(250);
        let cleaned = normalizer.clean_summary(Some(&long));
        assert_eq!(cleaned.chars().count(), 203);
        assert!(cleaned.ends_with("..."));

        let exact = "a".repeat(200);
        assert_eq!(normalizer.clean_summary(Some(&exact)), exact);
    }

    #[test]
    fn test_suggest_tags_filters_noise() {
        let normalizer = Normalizer::default();
        let tags = normalizer.suggest_tags(
            "Discussion ChatGPT (2025-03-14)",
            "Pourquoi 12345 ownership; ownership! borrowing",
        );
        assert_eq!(tags, vec!["ownership", "borrowing"]);
    }

    #[test]
    fn test_metadata_only_drops_messages_and_keeps_explicit_tags() {
        let raw = RawCapture {
            url: "http://test.com".to_string(),
            title: "Test Ext".to_string(),
            tags: vec![" Rust ".to_string(), "rust".to_string()],
            messages: vec![captured(Role::User, "<p>hello</p>", 0.0)],
            ..Default::default()
        };
        let record = Normalizer::default().normalize(raw, fixed_time()).unwrap();
        assert!(record.messages.is_empty());
        assert_eq!(record.tags, vec!["rust"]);
    }

    #[test]
    fn test_metadata_only_without_tags_stays_untagged() {
        let raw = RawCapture {
            url: "http://test.com".to_string(),
            title: "Understanding lifetimes".to_string(),
            ..Default::default()
        };
        let record = Normalizer::default().normalize(raw, fixed_time()).unwrap();
        assert!(record.tags.is_empty());
    }

    #[test]
    fn test_full_mode_suggests_tags_when_none_given() {
        let raw = RawCapture {
            url: "http://test.com".to_string(),
            title: "Understanding lifetimes".to_string(),
            ..Default::default()
        };
        let record = full_normalizer().normalize(raw, fixed_time()).unwrap();
        assert_eq!(record.tags, vec!["understanding", "lifetimes"]);
    }

    #[test]
    fn test_full_mode_sorts_converts_and_dedups() {
        let raw = RawCapture {
            url: "https://chatgpt.com/c/9".to_string(),
            title: "Order".to_string(),
            messages: vec![
                captured(Role::Assistant, "<p>Second <b>answer</b></p>", 200.0),
                captured(Role::User, "<p>First question</p>", 100.0),
                captured(Role::User, "<p>First   question</p>", 300.0),
                captured(Role::Assistant, "<button>Copy</button>", 400.0),
            ],
            ..Default::default()
        };
        let record = full_normalizer().normalize(raw, fixed_time()).unwrap();
        assert_eq!(
            record.messages,
            vec![
                Message::user("First question"),
                Message::assistant("Second **answer**"),
            ]
        );
    }

    #[test]
    fn test_dedup_keeps_different_roles() {
        let messages = vec![Message::user("same"), Message::assistant("same")];
        assert_eq!(dedup_messages(messages).len(), 2);
    }

    #[test]
    fn test_dedup_uses_leading_fifty_characters() {
        let prefix = "x".repeat(50);
        let messages = vec![
            Message::user(format!("{}tail one", prefix)),
            Message::user(format!("{}tail two", prefix)),
        ];
        let kept = dedup_messages(messages);
        assert_eq!(kept.len(), 1);
        assert!(kept[0].content.ends_with("one"));
    }

    #[test]
    fn test_raw_capture_deserializes_camel_case() {
        let json = r#"{
            "url": "https://claude.ai/chat/1",
            "title": "T",
            "messages": [{"role": "user", "html": "<p>x</p>", "offsetTop": 12.5}]
        }"#;
        let raw: RawCapture = serde_json::from_str(json).unwrap();
        assert_eq!(raw.messages[0].offset_top, 12.5);
        assert!(raw.tags.is_empty());
    }
}

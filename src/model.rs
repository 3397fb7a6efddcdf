//! Canonical record types shared by both runtime contexts
//!
//! Field names on the wire follow the JSON written by the browser add-on and
//! the web app (`camelCase`, provider stored as `llm`, capture time as epoch
//! milliseconds), so collections can be exchanged without translation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum number of tags a conversation carries.
pub const MAX_TAGS: usize = 4;

/// Generates a new stable record identifier.
///
/// Identifiers are content-independent UUID v4 strings; they are assigned
/// once and never recomputed from record fields.
pub fn new_record_id() -> String {
    Uuid::new_v4().to_string()
}

/// Author of a captured message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

/// One message of a captured transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Optional message time in epoch milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl Message {
    /// Creates a message without a timestamp
    ///
    /// # Examples
    ///
    /// ```
    /// use agregllm::model::{Message, Role};
    ///
    /// let msg = Message::new(Role::User, "Hello");
    /// assert_eq!(msg.role, Role::User);
    /// assert!(msg.timestamp.is_none());
    /// ```
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// The canonical conversation record
///
/// `url` is the identity key for deduplication: a store holds at most one
/// record per url. `id` is opaque and stable once assigned. Records without
/// `capturedAt` take their capture time from `date`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "ConversationWire")]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub url: String,
    /// Provider name (ChatGPT, Claude, ...)
    #[serde(rename = "llm")]
    pub llm_source: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub captured_at: DateTime<Utc>,
    /// True conversation date when the capture carried one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
    #[serde(default)]
    pub is_favorite: bool,
}

/// Stored shape of a [`Conversation`] with an optional capture time
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConversationWire {
    id: String,
    title: String,
    url: String,
    #[serde(rename = "llm")]
    llm_source: String,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    captured_at: Option<DateTime<Utc>>,
    #[serde(default)]
    date: Option<DateTime<Utc>>,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    messages: Vec<Message>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    folder_id: Option<String>,
    #[serde(default)]
    is_favorite: bool,
}

impl From<ConversationWire> for Conversation {
    fn from(wire: ConversationWire) -> Self {
        Self {
            id: wire.id,
            title: wire.title,
            url: wire.url,
            llm_source: wire.llm_source,
            captured_at: wire.captured_at.or(wire.date).unwrap_or_else(Utc::now),
            date: wire.date,
            summary: wire.summary,
            messages: wire.messages,
            tags: wire.tags,
            folder_id: wire.folder_id,
            is_favorite: wire.is_favorite,
        }
    }
}

impl Conversation {
    /// Creates an unfiled, untagged conversation with a fresh id
    ///
    /// # Examples
    ///
    /// ```
    /// use agregllm::model::Conversation;
    ///
    /// let conv = Conversation::new("https://chatgpt.com/c/1", "Rust lifetimes", "ChatGPT");
    /// assert_eq!(conv.llm_source, "ChatGPT");
    /// assert!(conv.tags.is_empty());
    /// assert!(conv.folder_id.is_none());
    /// ```
    pub fn new(url: impl Into<String>, title: impl Into<String>, llm: impl Into<String>) -> Self {
        Self {
            id: new_record_id(),
            title: title.into(),
            url: url.into(),
            llm_source: llm.into(),
            captured_at: Utc::now(),
            date: None,
            summary: String::new(),
            messages: Vec::new(),
            tags: Vec::new(),
            folder_id: None,
            is_favorite: false,
        }
    }

    /// Replaces the tag list with its normalized form
    pub fn set_tags<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.tags = normalize_tags(tags);
    }

    /// Text used for folder matching and search
    pub fn searchable_text(&self) -> String {
        format!("{} {}", self.title, self.summary)
    }
}

/// Trims, lowercases and deduplicates tags, keeping first-seen order and at
/// most [`MAX_TAGS`] entries.
///
/// # Examples
///
/// ```
/// use agregllm::model::normalize_tags;
///
/// let tags = normalize_tags([" Rust ", "rust", "", "Async", "tokio", "serde", "extra"]);
/// assert_eq!(tags, vec!["rust", "async", "tokio", "serde"]);
/// ```
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.as_ref().trim().to_lowercase();
        if tag.is_empty() || out.contains(&tag) {
            continue;
        }
        out.push(tag);
        if out.len() == MAX_TAGS {
            break;
        }
    }
    out
}

/// A folder in the web app's folder forest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl Folder {
    pub fn new(name: impl Into<String>, parent_id: Option<String>) -> Self {
        Self {
            id: new_record_id(),
            name: name.into(),
            parent_id,
            color: None,
        }
    }
}

/// Persisted marker for a deletion that still has to reach the add-on store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tombstone {
    pub url: String,
    pub id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub deleted_at: DateTime<Utc>,
}

impl Tombstone {
    pub fn for_record(record: &Conversation) -> Self {
        Self {
            url: record.url.clone(),
            id: record.id.clone(),
            deleted_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_ids_are_unique() {
        let a = new_record_id();
        let b = new_record_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 36);
    }

    #[test]
    fn test_conversation_serializes_with_wire_names() {
        let mut conv = Conversation::new("https://claude.ai/chat/1", "Title", "Claude");
        conv.folder_id = Some("f1".to_string());
        let value = serde_json::to_value(&conv).expect("serialize");

        assert_eq!(value["llm"], "Claude");
        assert!(value["capturedAt"].is_i64());
        assert_eq!(value["folderId"], "f1");
        assert_eq!(value["isFavorite"], false);
        assert!(value.get("date").is_none());
    }

    #[test]
    fn test_conversation_deserializes_minimal_addon_record() {
        let json = r#"{
            "id": "abc",
            "title": "Test Ext",
            "url": "http://test.com",
            "llm": "ChatGPT",
            "date": "2025-01-02T03:04:05Z"
        }"#;
        let conv: Conversation = serde_json::from_str(json).expect("deserialize");
        assert_eq!(conv.title, "Test Ext");
        assert!(conv.messages.is_empty());
        assert!(conv.tags.is_empty());
        assert_eq!(
            conv.date.map(|d| d.to_rfc3339()),
            Some("2025-01-02T03:04:05+00:00".to_string())
        );
        assert_eq!(Some(conv.captured_at), conv.date);

        let reread: Conversation = serde_json::from_str(json).expect("deserialize");
        assert_eq!(reread.captured_at, conv.captured_at);
    }

    #[test]
    fn test_explicit_captured_at_wins_over_date() {
        let json = r#"{
            "id": "abc",
            "title": "t",
            "url": "u",
            "llm": "Claude",
            "capturedAt": 1700000000000,
            "date": "2025-01-02T03:04:05Z"
        }"#;
        let conv: Conversation = serde_json::from_str(json).expect("deserialize");
        assert_eq!(conv.captured_at.timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let msg = Message::assistant("hi");
        let json = serde_json::to_string(&msg).expect("serialize");
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);
    }

    #[test]
    fn test_set_tags_caps_and_dedups() {
        let mut conv = Conversation::new("u", "t", "l");
        conv.set_tags(["A", "b", "a", "c", "d", "e"]);
        assert_eq!(conv.tags, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_tombstone_copies_identity() {
        let conv = Conversation::new("https://x/1", "t", "l");
        let tomb = Tombstone::for_record(&conv);
        assert_eq!(tomb.url, conv.url);
        assert_eq!(tomb.id, conv.id);
    }
}

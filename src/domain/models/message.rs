//! Message bus domain model.
//!
//! Messages are immutable after insert except for the read-mark. The
//! notification contract is deliberately two-step: `preview()` is what an
//! LLM-facing inbox tool may see; the full content costs an explicit read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::bson_datetime_opt;

/// Number of characters of content exposed in a notification preview.
pub const PREVIEW_CHARS: usize = 50;

/// Semantic kind of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Work handed to a specialist
    Task,
    /// Specialist result reported back
    Result,
    /// Progress or liveness note
    Status,
    /// Failure report
    Error,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Result => "result",
            Self::Status => "status",
            Self::Error => "error",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "task" => Some(Self::Task),
            "result" => Some(Self::Result),
            "status" => Some(Self::Status),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// Delivery priority. High-priority messages surface first in the inbox;
/// within equal priority the order is strict FIFO by `created_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessagePriority {
    High,
    Normal,
    Low,
}

impl Default for MessagePriority {
    fn default() -> Self {
        Self::Normal
    }
}

impl MessagePriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "high" => Some(Self::High),
            "normal" => Some(Self::Normal),
            "low" => Some(Self::Low),
            _ => None,
        }
    }

    /// Sort rank, lowest first. Stored values are strings, so inbox ordering
    /// is applied after retrieval using this rank.
    pub fn rank(&self) -> u8 {
        match self {
            Self::High => 0,
            Self::Normal => 1,
            Self::Low => 2,
        }
    }
}

/// One document in the `messages` collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub message_id: String,
    pub from_agent: String,
    pub to_agent: String,
    pub content: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub thread_id: String,
    pub priority: MessagePriority,
    /// Null until the recipient fetches the full content
    #[serde(default, with = "bson_datetime_opt")]
    pub read_at: Option<DateTime<Utc>>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Build a new unread message. A missing `thread_id` starts a new thread.
    pub fn new(
        from_agent: impl Into<String>,
        to_agent: impl Into<String>,
        content: impl Into<String>,
        message_type: MessageType,
        thread_id: Option<String>,
        priority: Option<MessagePriority>,
    ) -> Self {
        Self {
            message_id: Uuid::new_v4().to_string(),
            from_agent: from_agent.into(),
            to_agent: to_agent.into(),
            content: content.into(),
            message_type,
            thread_id: thread_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            priority: priority.unwrap_or_default(),
            read_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_read(&self) -> bool {
        self.read_at.is_some()
    }

    /// Lightweight notification projection of this message.
    pub fn preview(&self) -> MessagePreview {
        MessagePreview {
            message_id: self.message_id.clone(),
            from_agent: self.from_agent.clone(),
            message_type: self.message_type,
            priority: self.priority,
            preview: preview_of(&self.content),
            created_at: self.created_at,
        }
    }
}

/// Notification projection: metadata plus the first [`PREVIEW_CHARS`]
/// characters of content, `"..."`-suffixed iff truncated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePreview {
    pub message_id: String,
    pub from_agent: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub priority: MessagePriority,
    pub preview: String,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

/// Truncate `content` to [`PREVIEW_CHARS`] characters, appending `"..."` only
/// when something was actually cut. Counts characters, not bytes, so
/// multibyte content never splits.
pub fn preview_of(content: &str) -> String {
    let mut chars = content.char_indices();
    match chars.nth(PREVIEW_CHARS) {
        Some((boundary, _)) => format!("{}...", &content[..boundary]),
        None => content.to_string(),
    }
}

/// Inbox ordering: priority rank ascending (high first), then FIFO by
/// `created_at`. Used as a stable sort key over an unread fetch.
pub fn inbox_order(a: &Message, b: &Message) -> std::cmp::Ordering {
    a.priority
        .rank()
        .cmp(&b.priority.rank())
        .then(a.created_at.cmp(&b.created_at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_preview_exactly_50_chars_not_truncated() {
        let content = "a".repeat(50);
        assert_eq!(preview_of(&content), content);
    }

    #[test]
    fn test_preview_51_chars_truncated() {
        let content = "a".repeat(51);
        let preview = preview_of(&content);
        assert_eq!(preview.chars().count(), 53);
        assert!(preview.ends_with("..."));
        assert_eq!(&preview[..50], &content[..50]);
    }

    #[test]
    fn test_preview_short_content_untouched() {
        assert_eq!(preview_of("hello"), "hello");
        assert_eq!(preview_of(""), "");
    }

    #[test]
    fn test_preview_multibyte_boundary() {
        let content = "é".repeat(60);
        let preview = preview_of(&content);
        assert_eq!(preview.chars().count(), 53);
        assert!(preview.ends_with("..."));
    }

    #[test]
    fn test_new_message_defaults() {
        let msg = Message::new("a", "b", "hi", MessageType::Status, None, None);
        assert_eq!(msg.priority, MessagePriority::Normal);
        assert!(!msg.is_read());
        assert!(!msg.thread_id.is_empty());
    }

    #[test]
    fn test_thread_id_preserved() {
        let msg = Message::new(
            "a",
            "b",
            "hi",
            MessageType::Task,
            Some("thread-1".to_string()),
            None,
        );
        assert_eq!(msg.thread_id, "thread-1");
    }

    #[test]
    fn test_inbox_order_priority_beats_fifo() {
        let mut normal = Message::new("a", "b", "first", MessageType::Status, None, None);
        let mut high = Message::new(
            "a",
            "b",
            "second",
            MessageType::Status,
            None,
            Some(MessagePriority::High),
        );
        // The normal message arrived earlier.
        normal.created_at = Utc::now() - Duration::seconds(10);
        high.created_at = Utc::now();

        let mut inbox = vec![normal.clone(), high.clone()];
        inbox.sort_by(inbox_order);
        assert_eq!(inbox[0].message_id, high.message_id);
        assert_eq!(inbox[1].message_id, normal.message_id);
    }

    #[test]
    fn test_inbox_order_fifo_within_priority() {
        let mut first = Message::new("a", "b", "first", MessageType::Status, None, None);
        let second = Message::new("a", "b", "second", MessageType::Status, None, None);
        first.created_at = second.created_at - Duration::seconds(5);

        let mut inbox = vec![second.clone(), first.clone()];
        inbox.sort_by(inbox_order);
        assert_eq!(inbox[0].message_id, first.message_id);
    }

    #[test]
    fn test_document_field_names() {
        let msg = Message::new("a", "b", "hi", MessageType::Result, None, None);
        let value = serde_json::to_value(&msg).unwrap();
        assert!(value.get("messageId").is_some());
        assert!(value.get("fromAgent").is_some());
        assert_eq!(value["type"], "result");
        assert!(value.get("threadId").is_some());
    }
}

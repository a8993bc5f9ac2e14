//! Message bus store.
//!
//! Insert, inbox retrieval, notification previews, read-marking, and thread
//! retrieval. Messages are never deleted; the read-mark is the only mutation
//! a message ever sees.

use chrono::Utc;
use futures::TryStreamExt;
use mongodb::bson::doc;
use mongodb::options::ReturnDocument;
use mongodb::Collection;
use tracing::debug;

use crate::domain::error::StoreError;
use crate::domain::models::{
    inbox_order, Message, MessagePreview, MessagePriority, MessageType,
};

/// Default preview page size for `check_previews`.
pub const DEFAULT_PREVIEW_LIMIT: usize = 10;

#[derive(Clone)]
pub struct MessageStore {
    col: Collection<Message>,
}

impl MessageStore {
    pub fn new(col: Collection<Message>) -> Self {
        Self { col }
    }

    /// Insert a new message and return the stored record. A missing
    /// `thread_id` starts a fresh thread; priority defaults to normal.
    pub async fn send(
        &self,
        from_agent: &str,
        to_agent: &str,
        content: &str,
        message_type: MessageType,
        thread_id: Option<String>,
        priority: Option<MessagePriority>,
    ) -> Result<Message, StoreError> {
        let message = Message::new(from_agent, to_agent, content, message_type, thread_id, priority);
        self.col.insert_one(&message).await?;
        debug!(message_id = %message.message_id, to = to_agent, "message sent");
        Ok(message)
    }

    /// Unread messages for `agent_id`, high priority first, FIFO within
    /// equal priority. Priorities are stored as strings, so the priority
    /// ordering is applied after the indexed fetch.
    pub async fn inbox(
        &self,
        agent_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Message>, StoreError> {
        let cursor = self
            .col
            .find(doc! { "toAgent": agent_id, "readAt": null })
            .sort(doc! { "createdAt": 1 })
            .await?;
        let mut messages: Vec<Message> = cursor.try_collect().await?;
        messages.sort_by(inbox_order);
        if let Some(limit) = limit {
            messages.truncate(limit);
        }
        Ok(messages)
    }

    /// Notification previews for the LLM-facing inbox tool. Only metadata
    /// and the 50-character preview leave this method.
    pub async fn check_previews(
        &self,
        agent_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<MessagePreview>, StoreError> {
        let limit = limit.unwrap_or(DEFAULT_PREVIEW_LIMIT);
        let inbox = self.inbox(agent_id, Some(limit)).await?;
        Ok(inbox.iter().map(Message::preview).collect())
    }

    /// Return the full message and mark it read in a single atomic update.
    /// Re-reading is idempotent: the first read's timestamp is preserved.
    pub async fn read(&self, message_id: &str) -> Result<Message, StoreError> {
        let marked = self
            .col
            .find_one_and_update(
                doc! { "messageId": message_id, "readAt": null },
                doc! { "$set": { "readAt": bson::DateTime::from_chrono(Utc::now()) } },
            )
            .return_document(ReturnDocument::After)
            .await?;

        if let Some(message) = marked {
            return Ok(message);
        }

        // Already read, or unknown id.
        self.col
            .find_one(doc! { "messageId": message_id })
            .await?
            .ok_or_else(|| StoreError::not_found("message", message_id))
    }

    /// All messages of a thread, ascending by insertion time.
    pub async fn thread(&self, thread_id: &str) -> Result<Vec<Message>, StoreError> {
        let cursor = self
            .col
            .find(doc! { "threadId": thread_id })
            .sort(doc! { "createdAt": 1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    /// Most recent messages across all agents, for the REST listing.
    pub async fn recent(&self, limit: i64) -> Result<Vec<Message>, StoreError> {
        let cursor = self
            .col
            .find(doc! {})
            .sort(doc! { "createdAt": -1 })
            .limit(limit)
            .await?;
        Ok(cursor.try_collect().await?)
    }
}

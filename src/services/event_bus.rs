//! Event bus for WebSocket fan-out.
//!
//! A broadcast channel carries typed domain events; each subscriber receives
//! the JSON envelope `{type, data, timestamp}`. There is no backfill on
//! reconnect; UIs re-query REST to reconcile.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;

/// Typed domain event. Payload field names are part of the WebSocket
/// contract: note `content` on output chunks and `messageType` on message
/// notifications.
#[derive(Debug, Clone)]
pub enum Event {
    AgentCreated {
        agent_id: String,
        agent_type: String,
        parent_id: Option<String>,
    },
    AgentStatus {
        agent_id: String,
        status: String,
    },
    AgentOutput {
        agent_id: String,
        stream: String,
        content: String,
    },
    AgentKilled {
        agent_id: String,
    },
    MessageNew {
        message_id: String,
        from_agent: String,
        to_agent: String,
        message_type: String,
        preview: String,
    },
    CheckpointNew {
        checkpoint_id: String,
        agent_id: String,
        phase: String,
        timestamp: DateTime<Utc>,
    },
    TaskCreated {
        task_id: String,
        title: String,
    },
    TaskStatus {
        task_id: String,
        status: String,
    },
    SandboxEvent {
        sandbox_id: String,
        action: String,
    },
}

impl Event {
    /// Wire name of this event.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AgentCreated { .. } => "agent:created",
            Self::AgentStatus { .. } => "agent:status",
            Self::AgentOutput { .. } => "agent:output",
            Self::AgentKilled { .. } => "agent:killed",
            Self::MessageNew { .. } => "message:new",
            Self::CheckpointNew { .. } => "checkpoint:new",
            Self::TaskCreated { .. } => "task:created",
            Self::TaskStatus { .. } => "task:status",
            Self::SandboxEvent { .. } => "sandbox:event",
        }
    }

    /// Event payload as it appears under `data` in the envelope.
    pub fn data(&self) -> Value {
        match self {
            Self::AgentCreated {
                agent_id,
                agent_type,
                parent_id,
            } => json!({
                "agentId": agent_id,
                "type": agent_type,
                "parentId": parent_id,
            }),
            Self::AgentStatus { agent_id, status } => json!({
                "agentId": agent_id,
                "status": status,
            }),
            Self::AgentOutput {
                agent_id,
                stream,
                content,
            } => json!({
                "agentId": agent_id,
                "stream": stream,
                "content": content,
            }),
            Self::AgentKilled { agent_id } => json!({ "agentId": agent_id }),
            Self::MessageNew {
                message_id,
                from_agent,
                to_agent,
                message_type,
                preview,
            } => json!({
                "messageId": message_id,
                "fromAgent": from_agent,
                "toAgent": to_agent,
                "messageType": message_type,
                "preview": preview,
            }),
            Self::CheckpointNew {
                checkpoint_id,
                agent_id,
                phase,
                timestamp,
            } => json!({
                "checkpointId": checkpoint_id,
                "agentId": agent_id,
                "phase": phase,
                "timestamp": timestamp.to_rfc3339(),
            }),
            Self::TaskCreated { task_id, title } => json!({
                "taskId": task_id,
                "title": title,
            }),
            Self::TaskStatus { task_id, status } => json!({
                "taskId": task_id,
                "status": status,
            }),
            Self::SandboxEvent { sandbox_id, action } => json!({
                "sandboxId": sandbox_id,
                "action": action,
            }),
        }
    }
}

/// JSON envelope delivered to every WebSocket subscriber.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: Value,
    pub timestamp: String,
}

impl From<&Event> for Envelope {
    fn from(event: &Event) -> Self {
        Self {
            event_type: event.kind().to_string(),
            data: event.data(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Central event bus broadcasting envelopes to WebSocket subscribers.
pub struct EventBus {
    sender: broadcast::Sender<Envelope>,
    published: AtomicU64,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            published: AtomicU64::new(0),
        }
    }

    /// Publish an event. Send errors are ignored: no subscribers is normal.
    pub fn publish(&self, event: Event) {
        self.published.fetch_add(1, Ordering::Relaxed);
        let _ = self.sender.send(Envelope::from(&event));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

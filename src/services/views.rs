//! JSON presentation of stored records.
//!
//! Shared by tool results and REST responses: camelCase fields with RFC3339
//! timestamps instead of raw BSON datetime encoding.

use serde_json::{json, Value};

use crate::domain::models::{
    AgentRecord, Checkpoint, Message, MessagePreview, SandboxRecord, Task,
};

pub fn agent_json(agent: &AgentRecord) -> Value {
    json!({
        "agentId": agent.agent_id,
        "type": agent.agent_type.as_str(),
        "specialization": agent.specialization.map(|s| s.as_str()),
        "status": agent.status.as_str(),
        "sandboxId": agent.sandbox_id,
        "sandboxStatus": agent.sandbox_status.as_str(),
        "parentId": agent.parent_id,
        "taskId": agent.task_id,
        "sessionId": agent.session_id,
        "tokenUsage": {
            "totalInputTokens": agent.token_usage.total_input_tokens,
            "totalOutputTokens": agent.token_usage.total_output_tokens,
            "lastUpdated": agent.token_usage.last_updated.map(|t| t.to_rfc3339()),
        },
        "createdAt": agent.created_at.to_rfc3339(),
        "lastHeartbeat": agent.last_heartbeat.to_rfc3339(),
    })
}

pub fn message_json(message: &Message) -> Value {
    json!({
        "messageId": message.message_id,
        "fromAgent": message.from_agent,
        "toAgent": message.to_agent,
        "content": message.content,
        "type": message.message_type.as_str(),
        "threadId": message.thread_id,
        "priority": message.priority.as_str(),
        "readAt": message.read_at.map(|t| t.to_rfc3339()),
        "createdAt": message.created_at.to_rfc3339(),
    })
}

pub fn preview_json(preview: &MessagePreview) -> Value {
    json!({
        "messageId": preview.message_id,
        "fromAgent": preview.from_agent,
        "type": preview.message_type.as_str(),
        "priority": preview.priority.as_str(),
        "preview": preview.preview,
        "createdAt": preview.created_at.to_rfc3339(),
    })
}

pub fn task_json(task: &Task) -> Value {
    json!({
        "taskId": task.task_id,
        "parentTaskId": task.parent_task_id,
        "assignedTo": task.assigned_to,
        "title": task.title,
        "description": task.description,
        "status": task.status.as_str(),
        "result": task.result,
        "createdAt": task.created_at.to_rfc3339(),
        "updatedAt": task.updated_at.to_rfc3339(),
    })
}

pub fn checkpoint_json(checkpoint: &Checkpoint) -> Value {
    json!({
        "checkpointId": checkpoint.checkpoint_id,
        "agentId": checkpoint.agent_id,
        "summary": {
            "goal": checkpoint.summary.goal,
            "completed": checkpoint.summary.completed,
            "pending": checkpoint.summary.pending,
            "decisions": checkpoint.summary.decisions,
        },
        "resumePointer": {
            "nextAction": checkpoint.resume_pointer.next_action,
            "phase": checkpoint.resume_pointer.phase,
            "currentContext": checkpoint.resume_pointer.current_context,
        },
        "tokensUsed": checkpoint.tokens_used,
        "createdAt": checkpoint.created_at.to_rfc3339(),
    })
}

pub fn sandbox_json(record: &SandboxRecord) -> Value {
    json!({
        "sandboxId": record.sandbox_id,
        "agentId": record.agent_id,
        "status": record.status.as_str(),
        "metadata": {
            "agentType": record.metadata.agent_type.as_str(),
            "specialization": record.metadata.specialization.map(|s| s.as_str()),
            "createdBy": record.metadata.created_by,
        },
        "lifecycle": {
            "createdAt": record.lifecycle.created_at.to_rfc3339(),
            "pausedAt": record.lifecycle.paused_at.map(|t| t.to_rfc3339()),
            "resumedAt": record.lifecycle.resumed_at.map(|t| t.to_rfc3339()),
            "killedAt": record.lifecycle.killed_at.map(|t| t.to_rfc3339()),
            "lastHeartbeat": record.lifecycle.last_heartbeat.to_rfc3339(),
        },
        "resources": {
            "cpuCount": record.resources.cpu_count,
            "memoryMB": record.resources.memory_mb,
            "timeoutMs": record.resources.timeout_ms,
        },
        "costs": {
            "estimatedCost": record.costs.estimated_cost,
            "runtimeSeconds": record.costs.runtime_seconds,
        },
    })
}

//! Coordination tool set exposed to the LLM.
//!
//! Ten tools over the shared stores. The inbox tool returns previews only;
//! full content always costs an explicit `readMessage`. `spawnSpecialist`
//! creates the agent record but never starts a process; the change-stream
//! watcher does that when a task is assigned.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use crate::domain::error::RuntimeError;
use crate::domain::models::{
    AgentRecord, AgentStatus, AgentType, CheckpointSummary, MessageType, ResumePointer,
    Specialization,
};
use crate::domain::ports::ToolHandler;
use crate::infrastructure::claude::types::Tool;
use crate::infrastructure::mongo::Stores;
use crate::services::views::{agent_json, message_json, preview_json, task_json};

/// Observer invoked after every tool execution: `(name, input, result)`.
/// The API layer uses it to emit WebSocket events.
pub type ToolObserver = Arc<dyn Fn(&str, &Value, &Value) + Send + Sync>;

/// Tool executor bound to one agent's identity.
pub struct CoordinationTools {
    agent_id: String,
    is_director: bool,
    stores: Stores,
    observer: Option<ToolObserver>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckInboxInput {
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadMessageInput {
    message_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendMessageInput {
    to_agent_id: String,
    content: String,
    #[serde(rename = "type")]
    message_type: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckpointInput {
    summary: CheckpointSummary,
    resume_pointer: ResumePointer,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTaskInput {
    title: String,
    description: String,
    parent_task_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssignTaskInput {
    task_id: String,
    agent_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompleteTaskInput {
    task_id: String,
    result: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetTaskStatusInput {
    task_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListAgentsInput {
    #[serde(rename = "type")]
    agent_type: Option<String>,
    status: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpawnSpecialistInput {
    specialization: String,
}

impl CoordinationTools {
    pub fn new(agent_id: impl Into<String>, is_director: bool, stores: Stores) -> Self {
        Self {
            agent_id: agent_id.into(),
            is_director,
            stores,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: ToolObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Tool schema for the given role. `spawnSpecialist` only exists for
    /// directors.
    pub fn catalogue(is_director: bool) -> Vec<Tool> {
        let mut tools = vec![
            Tool {
                name: "checkInbox".to_string(),
                description: "Check your inbox for unread message notifications. Returns \
                              lightweight previews (first 50 characters); use readMessage \
                              for full content."
                    .to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "limit": { "type": "integer", "description": "Maximum previews to return (default 10)" }
                    }
                }),
            },
            Tool {
                name: "readMessage".to_string(),
                description: "Read the full content of a message and mark it as read."
                    .to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "messageId": { "type": "string" }
                    },
                    "required": ["messageId"]
                }),
            },
            Tool {
                name: "sendMessage".to_string(),
                description: "Send a message to another agent.".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "toAgentId": { "type": "string" },
                        "content": { "type": "string" },
                        "type": { "type": "string", "enum": ["task", "result", "status", "error"] }
                    },
                    "required": ["toAgentId", "content", "type"]
                }),
            },
            Tool {
                name: "checkpoint".to_string(),
                description: "Save a progress checkpoint so a restart can resume your work."
                    .to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "summary": {
                            "type": "object",
                            "properties": {
                                "goal": { "type": "string" },
                                "completed": { "type": "array", "items": { "type": "string" } },
                                "pending": { "type": "array", "items": { "type": "string" } },
                                "decisions": { "type": "array", "items": { "type": "string" } }
                            },
                            "required": ["goal"]
                        },
                        "resumePointer": {
                            "type": "object",
                            "properties": {
                                "nextAction": { "type": "string" },
                                "phase": { "type": "string" },
                                "currentContext": { "type": "string" }
                            },
                            "required": ["nextAction", "phase"]
                        }
                    },
                    "required": ["summary", "resumePointer"]
                }),
            },
            Tool {
                name: "createTask".to_string(),
                description: "Create a new task.".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "title": { "type": "string" },
                        "description": { "type": "string" },
                        "parentTaskId": { "type": "string" }
                    },
                    "required": ["title", "description"]
                }),
            },
            Tool {
                name: "assignTask".to_string(),
                description: "Assign a pending task to an agent.".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "taskId": { "type": "string" },
                        "agentId": { "type": "string" }
                    },
                    "required": ["taskId", "agentId"]
                }),
            },
            Tool {
                name: "completeTask".to_string(),
                description: "Mark a task completed with its result.".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "taskId": { "type": "string" },
                        "result": { "type": "string" }
                    },
                    "required": ["taskId", "result"]
                }),
            },
            Tool {
                name: "getTaskStatus".to_string(),
                description: "Get the current snapshot of a task.".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "taskId": { "type": "string" }
                    },
                    "required": ["taskId"]
                }),
            },
            Tool {
                name: "listAgents".to_string(),
                description: "List active agents (idle, working, or waiting).".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "type": { "type": "string", "enum": ["director", "specialist"] },
                        "status": { "type": "string", "enum": ["idle", "working", "waiting"] }
                    }
                }),
            },
        ];

        if is_director {
            tools.push(Tool {
                name: "spawnSpecialist".to_string(),
                description: "Create a new specialist agent record. The control plane starts \
                              its process when a task is assigned to it."
                    .to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "specialization": {
                            "type": "string",
                            "enum": ["researcher", "writer", "analyst", "general"]
                        }
                    },
                    "required": ["specialization"]
                }),
            });
        }

        tools
    }

    fn parse<T: for<'de> Deserialize<'de>>(input: Value) -> Result<T, RuntimeError> {
        serde_json::from_value(input).map_err(|e| RuntimeError::InvalidInput(e.to_string()))
    }

    async fn dispatch(&self, name: &str, input: Value) -> Result<Value, RuntimeError> {
        match name {
            "checkInbox" => {
                let input: CheckInboxInput = Self::parse(input)?;
                let previews = self
                    .stores
                    .messages
                    .check_previews(&self.agent_id, input.limit)
                    .await?;
                Ok(Value::Array(previews.iter().map(preview_json).collect()))
            }
            "readMessage" => {
                let input: ReadMessageInput = Self::parse(input)?;
                let message = self.stores.messages.read(&input.message_id).await?;
                Ok(message_json(&message))
            }
            "sendMessage" => {
                let input: SendMessageInput = Self::parse(input)?;
                let message_type = MessageType::parse_str(&input.message_type)
                    .ok_or_else(|| {
                        RuntimeError::InvalidInput(format!(
                            "unknown message type: {}",
                            input.message_type
                        ))
                    })?;
                // Recipients must exist; the sender is this agent by construction.
                self.stores.agents.get(&input.to_agent_id).await?;
                let message = self
                    .stores
                    .messages
                    .send(
                        &self.agent_id,
                        &input.to_agent_id,
                        &input.content,
                        message_type,
                        None,
                        None,
                    )
                    .await?;
                Ok(json!({
                    "messageId": message.message_id,
                    "threadId": message.thread_id,
                }))
            }
            "checkpoint" => {
                let input: CheckpointInput = Self::parse(input)?;
                let agent = self.stores.agents.get(&self.agent_id).await?;
                let checkpoint = self
                    .stores
                    .checkpoints
                    .create(
                        &self.agent_id,
                        input.summary,
                        input.resume_pointer,
                        agent.token_usage.total(),
                    )
                    .await?;
                Ok(json!({
                    "checkpointId": checkpoint.checkpoint_id,
                    "phase": checkpoint.resume_pointer.phase,
                }))
            }
            "createTask" => {
                let input: CreateTaskInput = Self::parse(input)?;
                let task = self
                    .stores
                    .tasks
                    .create(&input.title, &input.description, input.parent_task_id)
                    .await?;
                Ok(json!({
                    "taskId": task.task_id,
                    "status": task.status.as_str(),
                }))
            }
            "assignTask" => {
                let input: AssignTaskInput = Self::parse(input)?;
                let task = self
                    .stores
                    .tasks
                    .assign(&input.task_id, &input.agent_id)
                    .await?;
                Ok(json!({
                    "taskId": task.task_id,
                    "assignedTo": task.assigned_to,
                    "status": task.status.as_str(),
                }))
            }
            "completeTask" => {
                let input: CompleteTaskInput = Self::parse(input)?;
                let task = self
                    .stores
                    .tasks
                    .complete(&input.task_id, &input.result)
                    .await?;
                Ok(json!({
                    "taskId": task.task_id,
                    "status": task.status.as_str(),
                }))
            }
            "getTaskStatus" => {
                let input: GetTaskStatusInput = Self::parse(input)?;
                let task = self.stores.tasks.get(&input.task_id).await?;
                Ok(task_json(&task))
            }
            "listAgents" => {
                let input: ListAgentsInput = Self::parse(input)?;
                let agent_type = match input.agent_type.as_deref() {
                    Some(s) => Some(AgentType::parse_str(s).ok_or_else(|| {
                        RuntimeError::InvalidInput(format!("unknown agent type: {s}"))
                    })?),
                    None => None,
                };
                let status = match input.status.as_deref() {
                    Some(s) => Some(AgentStatus::parse_str(s).ok_or_else(|| {
                        RuntimeError::InvalidInput(format!("unknown status: {s}"))
                    })?),
                    None => None,
                };
                let agents = self.stores.agents.list(agent_type, status).await?;
                Ok(Value::Array(
                    agents
                        .iter()
                        .filter(|a| a.status.is_listable())
                        .map(agent_json)
                        .collect(),
                ))
            }
            "spawnSpecialist" => {
                if !self.is_director {
                    return Err(RuntimeError::DirectorOnly("spawnSpecialist".to_string()));
                }
                let input: SpawnSpecialistInput = Self::parse(input)?;
                let specialization = Specialization::parse_str(&input.specialization)
                    .ok_or_else(|| {
                        RuntimeError::InvalidInput(format!(
                            "unknown specialization: {}",
                            input.specialization
                        ))
                    })?;
                let specialist =
                    AgentRecord::specialist(self.agent_id.clone(), specialization);
                let specialist = self.stores.agents.register(specialist).await?;
                Ok(json!({
                    "agentId": specialist.agent_id,
                    "specialization": specialization.as_str(),
                    "status": specialist.status.as_str(),
                }))
            }
            other => Err(RuntimeError::UnknownTool(other.to_string())),
        }
    }
}

#[async_trait]
impl ToolHandler for CoordinationTools {
    fn definitions(&self) -> Vec<Tool> {
        Self::catalogue(self.is_director)
    }

    async fn call(&self, name: &str, input: Value) -> Result<Value, RuntimeError> {
        debug!(agent_id = %self.agent_id, tool = name, "executing tool");
        let result = self.dispatch(name, input.clone()).await;
        if let (Some(observer), Ok(value)) = (&self.observer, &result) {
            observer(name, &input, value);
        }
        result
    }
}

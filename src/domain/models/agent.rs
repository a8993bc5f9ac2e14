//! Agent registry domain model.
//!
//! Agents are durable logical actors. A director decomposes and aggregates;
//! a specialist executes one assigned task. The registry record is the only
//! durable identity an agent has; the OS process realizing it lives and dies
//! inside the shared sandbox.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::bson_datetime_opt;

/// Role of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    /// Decomposes the root task and aggregates specialist results
    Director,
    /// Executes one assigned subtask
    Specialist,
}

impl AgentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Director => "director",
            Self::Specialist => "specialist",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "director" => Some(Self::Director),
            "specialist" => Some(Self::Specialist),
            _ => None,
        }
    }
}

/// Specialist capability class, chosen by the director during decomposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Specialization {
    Researcher,
    Writer,
    Analyst,
    General,
}

impl Default for Specialization {
    fn default() -> Self {
        Self::General
    }
}

impl Specialization {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Researcher => "researcher",
            Self::Writer => "writer",
            Self::Analyst => "analyst",
            Self::General => "general",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "researcher" => Some(Self::Researcher),
            "writer" => Some(Self::Writer),
            "analyst" => Some(Self::Analyst),
            "general" => Some(Self::General),
            _ => None,
        }
    }
}

/// Lifecycle status of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Registered, no work in flight
    Idle,
    /// Process running a task
    Working,
    /// Blocked on peers (director waiting for specialists)
    Waiting,
    /// Finished its last run cleanly (also set after a kill)
    Completed,
    /// Last run exited non-zero or failed fatally
    Error,
}

impl Default for AgentStatus {
    fn default() -> Self {
        Self::Idle
    }
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Working => "working",
            Self::Waiting => "waiting",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "idle" => Some(Self::Idle),
            "working" => Some(Self::Working),
            "waiting" => Some(Self::Waiting),
            "completed" => Some(Self::Completed),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// Statuses in which an agent is visible to the `listAgents` tool.
    pub fn is_listable(&self) -> bool {
        matches!(self, Self::Idle | Self::Working | Self::Waiting)
    }
}

/// Sandbox attachment state of an agent, tracked on the agent record so the
/// UI can render it without joining the sandbox collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentSandboxStatus {
    None,
    Active,
    Paused,
    Killed,
}

impl Default for AgentSandboxStatus {
    fn default() -> Self {
        Self::None
    }
}

impl AgentSandboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Killed => "killed",
        }
    }
}

/// Cumulative token counters for one agent across all of its runs.
///
/// Counters only ever increase; `last_updated` is stamped on every increment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    #[serde(default, with = "bson_datetime_opt")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.total_input_tokens + self.total_output_tokens
    }
}

/// Durable agent record, one document per agent in the `agents` collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRecord {
    /// Unique identifier (UUID v4 string), distinct from the database `_id`
    pub agent_id: String,
    #[serde(rename = "type")]
    pub agent_type: AgentType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specialization: Option<Specialization>,
    pub status: AgentStatus,
    pub sandbox_id: Option<String>,
    pub sandbox_status: AgentSandboxStatus,
    /// Spawning director for specialists; null for directors
    pub parent_id: Option<String>,
    /// Current task, set while status is `working`
    pub task_id: Option<String>,
    /// Durable session handle, assigned on first LLM run
    pub session_id: Option<String>,
    pub token_usage: TokenUsage,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub last_heartbeat: DateTime<Utc>,
}

impl AgentRecord {
    /// Create a director record.
    pub fn director() -> Self {
        let now = Utc::now();
        Self {
            agent_id: Uuid::new_v4().to_string(),
            agent_type: AgentType::Director,
            specialization: None,
            status: AgentStatus::Idle,
            sandbox_id: None,
            sandbox_status: AgentSandboxStatus::None,
            parent_id: None,
            task_id: None,
            session_id: None,
            token_usage: TokenUsage::default(),
            created_at: now,
            last_heartbeat: now,
        }
    }

    /// Create a specialist record spawned by `parent_id`.
    pub fn specialist(parent_id: impl Into<String>, specialization: Specialization) -> Self {
        let now = Utc::now();
        Self {
            agent_id: Uuid::new_v4().to_string(),
            agent_type: AgentType::Specialist,
            specialization: Some(specialization),
            status: AgentStatus::Idle,
            sandbox_id: None,
            sandbox_status: AgentSandboxStatus::None,
            parent_id: Some(parent_id.into()),
            task_id: None,
            session_id: None,
            token_usage: TokenUsage::default(),
            created_at: now,
            last_heartbeat: now,
        }
    }

    pub fn is_director(&self) -> bool {
        self.agent_type == AgentType::Director
    }

    pub fn is_specialist(&self) -> bool {
        self.agent_type == AgentType::Specialist
    }

    /// A specialist must reference the director that spawned it.
    pub fn validate(&self) -> Result<(), String> {
        if self.agent_id.is_empty() {
            return Err("agentId cannot be empty".to_string());
        }
        if self.is_specialist() && self.parent_id.is_none() {
            return Err("specialist requires a parentId".to_string());
        }
        if self.is_director() && self.parent_id.is_some() {
            return Err("director cannot have a parentId".to_string());
        }
        Ok(())
    }
}

/// True when `s` looks like a canonical UUID. Identifiers that travel on a
/// command line must pass this check (task text never does; it goes through
/// the environment).
pub fn is_uuid_shaped(s: &str) -> bool {
    Uuid::parse_str(s).is_ok()
}

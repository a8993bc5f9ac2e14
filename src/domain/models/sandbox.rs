//! Sandbox tracking domain model.
//!
//! One record per (sandbox, agent) pair. Every agent of a session shares the
//! same sandbox id while the shared sandbox is alive; lifecycle timestamps
//! are set once and never rewritten.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::agent::{AgentType, Specialization};
use super::bson_datetime_opt;

/// Lifecycle state of a sandbox attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxState {
    Creating,
    Active,
    Paused,
    Resuming,
    Killed,
}

impl SandboxState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Creating => "creating",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Resuming => "resuming",
            Self::Killed => "killed",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "creating" => Some(Self::Creating),
            "active" => Some(Self::Active),
            "paused" => Some(Self::Paused),
            "resuming" => Some(Self::Resuming),
            "killed" => Some(Self::Killed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxMetadata {
    pub agent_type: AgentType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specialization: Option<Specialization>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxLifecycle {
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "bson_datetime_opt")]
    pub paused_at: Option<DateTime<Utc>>,
    #[serde(default, with = "bson_datetime_opt")]
    pub resumed_at: Option<DateTime<Utc>>,
    #[serde(default, with = "bson_datetime_opt")]
    pub killed_at: Option<DateTime<Utc>>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub last_heartbeat: DateTime<Utc>,
}

/// Resource envelope requested from the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxResources {
    pub cpu_count: u32,
    #[serde(rename = "memoryMB")]
    pub memory_mb: u32,
    pub timeout_ms: u64,
}

impl Default for SandboxResources {
    fn default() -> Self {
        Self {
            cpu_count: 2,
            memory_mb: 1024,
            timeout_ms: 30 * 60 * 1000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxCosts {
    pub estimated_cost: f64,
    pub runtime_seconds: f64,
}

/// One document in the `sandboxes` collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxRecord {
    pub sandbox_id: String,
    pub agent_id: String,
    pub status: SandboxState,
    pub metadata: SandboxMetadata,
    pub lifecycle: SandboxLifecycle,
    pub resources: SandboxResources,
    pub costs: SandboxCosts,
}

impl SandboxRecord {
    pub fn new(
        sandbox_id: impl Into<String>,
        agent_id: impl Into<String>,
        metadata: SandboxMetadata,
        resources: SandboxResources,
    ) -> Self {
        let now = Utc::now();
        Self {
            sandbox_id: sandbox_id.into(),
            agent_id: agent_id.into(),
            status: SandboxState::Creating,
            metadata,
            lifecycle: SandboxLifecycle {
                created_at: now,
                paused_at: None,
                resumed_at: None,
                killed_at: None,
                last_heartbeat: now,
            },
            resources,
            costs: SandboxCosts::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SandboxRecord {
        SandboxRecord::new(
            "sbx-1",
            "agent-1",
            SandboxMetadata {
                agent_type: AgentType::Director,
                specialization: None,
                created_by: Some("control-plane".to_string()),
            },
            SandboxResources::default(),
        )
    }

    #[test]
    fn test_new_record_is_creating() {
        let record = sample();
        assert_eq!(record.status, SandboxState::Creating);
        assert!(record.lifecycle.paused_at.is_none());
        assert!(record.lifecycle.killed_at.is_none());
        assert_eq!(record.costs.estimated_cost, 0.0);
    }

    #[test]
    fn test_state_round_trip() {
        for s in ["creating", "active", "paused", "resuming", "killed"] {
            assert_eq!(SandboxState::parse_str(s).unwrap().as_str(), s);
        }
    }

    #[test]
    fn test_document_field_names() {
        let value = serde_json::to_value(sample()).unwrap();
        assert!(value.get("sandboxId").is_some());
        assert!(value["metadata"].get("agentType").is_some());
        assert!(value["lifecycle"].get("lastHeartbeat").is_some());
        assert!(value["resources"].get("memoryMB").is_some());
        assert!(value["costs"].get("estimatedCost").is_some());
    }
}

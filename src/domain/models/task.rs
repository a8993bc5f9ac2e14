//! Task domain model.
//!
//! Task status moves forward only: pending → assigned → in_progress →
//! completed/failed. `complete` may jump from any non-terminal state, which
//! keeps the lifecycle a DAG rather than a single chain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a task in the coordination plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created, no assignee yet
    Pending,
    /// Assignee chosen, process not started
    Assigned,
    /// An agent process is executing it
    InProgress,
    /// Terminal success, `result` holds the payload
    Completed,
    /// Terminal failure, `result` holds the reason
    Failed,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Assigned => "assigned",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "assigned" => Some(Self::Assigned),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Valid forward transitions from this status. Terminal states allow
    /// none; `complete`/`fail` may skip intermediate states.
    pub fn valid_transitions(&self) -> &'static [TaskStatus] {
        match self {
            Self::Pending => &[Self::Assigned, Self::Completed, Self::Failed],
            Self::Assigned => &[Self::InProgress, Self::Completed, Self::Failed],
            Self::InProgress => &[Self::Completed, Self::Failed],
            Self::Completed => &[],
            Self::Failed => &[],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

/// One document in the `tasks` collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub task_id: String,
    /// Parent for subtasks spawned by a director; null for root tasks
    pub parent_task_id: Option<String>,
    /// Set exactly when status leaves `pending`
    pub assigned_to: Option<String>,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    /// Success payload or failure reason once terminal
    pub result: Option<String>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        parent_task_id: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            task_id: Uuid::new_v4().to_string(),
            parent_task_id,
            assigned_to: None,
            title: title.into(),
            description: description.into(),
            status: TaskStatus::Pending,
            result: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_task_is_pending() {
        let task = Task::new("title", "desc", None);
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.assigned_to.is_none());
        assert!(task.result.is_none());
    }

    #[test]
    fn test_forward_transitions_allowed() {
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Assigned));
        assert!(TaskStatus::Assigned.can_transition_to(TaskStatus::InProgress));
        assert!(TaskStatus::InProgress.can_transition_to(TaskStatus::Completed));
        assert!(TaskStatus::InProgress.can_transition_to(TaskStatus::Failed));
        // complete may skip intermediate states
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Completed));
        assert!(TaskStatus::Assigned.can_transition_to(TaskStatus::Failed));
    }

    #[test]
    fn test_backward_transitions_forbidden() {
        assert!(!TaskStatus::Assigned.can_transition_to(TaskStatus::Pending));
        assert!(!TaskStatus::InProgress.can_transition_to(TaskStatus::Assigned));
        assert!(!TaskStatus::Completed.can_transition_to(TaskStatus::InProgress));
        assert!(!TaskStatus::Failed.can_transition_to(TaskStatus::Pending));
    }

    #[test]
    fn test_terminal_states_immutable() {
        assert!(TaskStatus::Completed.valid_transitions().is_empty());
        assert!(TaskStatus::Failed.valid_transitions().is_empty());
        assert!(!TaskStatus::Completed.can_transition_to(TaskStatus::Failed));
    }

    #[test]
    fn test_status_round_trip() {
        for s in ["pending", "assigned", "in_progress", "completed", "failed"] {
            assert_eq!(TaskStatus::parse_str(s).unwrap().as_str(), s);
        }
        assert!(TaskStatus::parse_str("running").is_none());
    }

    #[test]
    fn test_document_field_names() {
        let task = Task::new("t", "d", Some("parent".to_string()));
        let value = serde_json::to_value(&task).unwrap();
        assert!(value.get("taskId").is_some());
        assert!(value.get("parentTaskId").is_some());
        assert!(value.get("assignedTo").is_some());
        assert_eq!(value["status"], "pending");
    }
}

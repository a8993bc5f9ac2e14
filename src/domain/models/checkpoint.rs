//! Checkpoint domain model.
//!
//! Checkpoints are the only durable "process state" an agent has. They are
//! append-only; resumption means rendering the latest one into a text block
//! and injecting it verbatim into the next run's system prompt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use uuid::Uuid;

/// Logical progress summary at the time of the checkpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointSummary {
    /// What the agent is ultimately trying to achieve
    pub goal: String,
    #[serde(default)]
    pub completed: Vec<String>,
    #[serde(default)]
    pub pending: Vec<String>,
    #[serde(default)]
    pub decisions: Vec<String>,
}

/// Where a restarted run should pick up.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumePointer {
    pub next_action: String,
    pub phase: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_context: Option<String>,
}

/// One document in the `checkpoints` collection. Never updated after insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub checkpoint_id: String,
    pub agent_id: String,
    pub summary: CheckpointSummary,
    pub resume_pointer: ResumePointer,
    pub tokens_used: u64,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(
        agent_id: impl Into<String>,
        summary: CheckpointSummary,
        resume_pointer: ResumePointer,
        tokens_used: u64,
    ) -> Self {
        Self {
            checkpoint_id: Uuid::new_v4().to_string(),
            agent_id: agent_id.into(),
            summary,
            resume_pointer,
            tokens_used,
            created_at: Utc::now(),
        }
    }

    /// A checkpoint is only useful if it can actually drive a resume.
    pub fn validate(&self) -> Result<(), String> {
        if self.summary.goal.trim().is_empty() {
            return Err("summary.goal cannot be empty".to_string());
        }
        if self.resume_pointer.next_action.trim().is_empty() {
            return Err("resumePointer.nextAction cannot be empty".to_string());
        }
        if self.resume_pointer.phase.trim().is_empty() {
            return Err("resumePointer.phase cannot be empty".to_string());
        }
        Ok(())
    }

    /// Render this checkpoint as the resume-context text block injected into
    /// the system prompt of the agent's next run.
    pub fn render_resume_context(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Resuming from a previous checkpoint.");
        let _ = writeln!(out, "Goal: {}", self.summary.goal);

        if !self.summary.completed.is_empty() {
            let _ = writeln!(out, "Completed:");
            for item in &self.summary.completed {
                let _ = writeln!(out, "- {item}");
            }
        }
        if !self.summary.pending.is_empty() {
            let _ = writeln!(out, "Pending:");
            for item in &self.summary.pending {
                let _ = writeln!(out, "- {item}");
            }
        }
        if !self.summary.decisions.is_empty() {
            let _ = writeln!(out, "Decisions so far:");
            for item in &self.summary.decisions {
                let _ = writeln!(out, "- {item}");
            }
        }

        let _ = writeln!(out, "Next action: {}", self.resume_pointer.next_action);
        let _ = writeln!(out, "Phase: {}", self.resume_pointer.phase);
        if let Some(context) = &self.resume_pointer.current_context {
            let _ = writeln!(out, "Context: {context}");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Checkpoint {
        Checkpoint::new(
            "agent-1",
            CheckpointSummary {
                goal: "Research coordination patterns".to_string(),
                completed: vec!["found three papers".to_string()],
                pending: vec!["summarize findings".to_string()],
                decisions: vec!["focus on change streams".to_string()],
            },
            ResumePointer {
                next_action: "write summary".to_string(),
                phase: "waiting".to_string(),
                current_context: Some("papers in /tmp/refs".to_string()),
            },
            1234,
        )
    }

    #[test]
    fn test_validate_rejects_empty_fields() {
        let mut cp = sample();
        assert!(cp.validate().is_ok());

        cp.summary.goal = "  ".to_string();
        assert!(cp.validate().is_err());

        let mut cp = sample();
        cp.resume_pointer.next_action = String::new();
        assert!(cp.validate().is_err());

        let mut cp = sample();
        cp.resume_pointer.phase = String::new();
        assert!(cp.validate().is_err());
    }

    #[test]
    fn test_resume_context_contains_everything() {
        let cp = sample();
        let text = cp.render_resume_context();

        assert!(text.contains(&cp.summary.goal));
        for item in cp
            .summary
            .completed
            .iter()
            .chain(&cp.summary.pending)
            .chain(&cp.summary.decisions)
        {
            assert!(text.contains(item), "missing: {item}");
        }
        assert!(text.contains(&cp.resume_pointer.next_action));
        assert!(text.contains(&cp.resume_pointer.phase));
        assert!(text.contains("papers in /tmp/refs"));
    }

    #[test]
    fn test_resume_context_omits_empty_sections() {
        let cp = Checkpoint::new(
            "agent-1",
            CheckpointSummary {
                goal: "g".to_string(),
                ..Default::default()
            },
            ResumePointer {
                next_action: "n".to_string(),
                phase: "p".to_string(),
                current_context: None,
            },
            0,
        );
        let text = cp.render_resume_context();
        assert!(!text.contains("Completed:"));
        assert!(!text.contains("Pending:"));
        assert!(!text.contains("Context:"));
    }

    #[test]
    fn test_document_field_names() {
        let value = serde_json::to_value(sample()).unwrap();
        assert!(value.get("checkpointId").is_some());
        assert!(value.get("resumePointer").is_some());
        assert!(value["resumePointer"].get("nextAction").is_some());
        assert!(value.get("tokensUsed").is_some());
    }
}

//! Agent registry: durable agent records, sessions, token accounting.
//!
//! Token counters are cumulative and only ever incremented (`$inc`), so
//! concurrent runs of the same logical agent cannot lose counts. The
//! heartbeat advances on every status update and token increment.

use chrono::Utc;
use futures::TryStreamExt;
use mongodb::bson::doc;
use mongodb::options::ReturnDocument;
use mongodb::Collection;
use rand::Rng;
use tracing::{debug, info};

use crate::domain::error::StoreError;
use crate::domain::models::{
    AgentRecord, AgentSandboxStatus, AgentStatus, AgentType,
};

#[derive(Clone)]
pub struct AgentRegistry {
    col: Collection<AgentRecord>,
}

impl AgentRegistry {
    pub fn new(col: Collection<AgentRecord>) -> Self {
        Self { col }
    }

    fn now_bson() -> bson::DateTime {
        bson::DateTime::from_chrono(Utc::now())
    }

    /// Insert a new agent record. A duplicate `agentId` is rejected by the
    /// unique index and surfaces as `StoreError::DuplicateKey`.
    pub async fn register(&self, agent: AgentRecord) -> Result<AgentRecord, StoreError> {
        agent.validate().map_err(StoreError::Validation)?;
        if let Some(parent_id) = &agent.parent_id {
            // A specialist's parent must be an existing director.
            let parent = self.get(parent_id).await?;
            if parent.agent_type != AgentType::Director {
                return Err(StoreError::Validation(format!(
                    "parent {parent_id} is not a director"
                )));
            }
        }
        self.col.insert_one(&agent).await?;
        info!(agent_id = %agent.agent_id, kind = agent.agent_type.as_str(), "agent registered");
        Ok(agent)
    }

    pub async fn get(&self, agent_id: &str) -> Result<AgentRecord, StoreError> {
        self.col
            .find_one(doc! { "agentId": agent_id })
            .await?
            .ok_or_else(|| StoreError::not_found("agent", agent_id))
    }

    pub async fn list(
        &self,
        agent_type: Option<AgentType>,
        status: Option<AgentStatus>,
    ) -> Result<Vec<AgentRecord>, StoreError> {
        let mut filter = doc! {};
        if let Some(agent_type) = agent_type {
            filter.insert("type", agent_type.as_str());
        }
        if let Some(status) = status {
            filter.insert("status", status.as_str());
        }
        let cursor = self.col.find(filter).sort(doc! { "createdAt": 1 }).await?;
        Ok(cursor.try_collect().await?)
    }

    /// Update lifecycle status (and optionally the current task), advancing
    /// the heartbeat.
    pub async fn update_status(
        &self,
        agent_id: &str,
        status: AgentStatus,
        task_id: Option<&str>,
    ) -> Result<AgentRecord, StoreError> {
        let mut set = doc! {
            "status": status.as_str(),
            "lastHeartbeat": Self::now_bson(),
        };
        match task_id {
            Some(task_id) => set.insert("taskId", task_id),
            None => set.insert("taskId", bson::Bson::Null),
        };

        self.col
            .find_one_and_update(doc! { "agentId": agent_id }, doc! { "$set": set })
            .return_document(ReturnDocument::After)
            .await?
            .ok_or_else(|| StoreError::not_found("agent", agent_id))
    }

    /// Advance only the heartbeat.
    pub async fn heartbeat(&self, agent_id: &str) -> Result<(), StoreError> {
        let result = self
            .col
            .update_one(
                doc! { "agentId": agent_id },
                doc! { "$set": { "lastHeartbeat": Self::now_bson() } },
            )
            .await?;
        if result.matched_count == 0 {
            return Err(StoreError::not_found("agent", agent_id));
        }
        Ok(())
    }

    /// Return the agent's durable session id, generating and storing one on
    /// first use. The id correlates resumed runs for token and UI
    /// attribution; it is not a credential.
    pub async fn get_or_create_session(&self, agent_id: &str) -> Result<String, StoreError> {
        let agent = self.get(agent_id).await?;
        if let Some(session_id) = agent.session_id {
            return Ok(session_id);
        }

        let session_id = new_session_id();
        // Only set if still unset, so two racing runs converge on one id.
        self.col
            .update_one(
                doc! { "agentId": agent_id, "sessionId": null },
                doc! { "$set": { "sessionId": session_id.as_str() } },
            )
            .await?;

        let agent = self.get(agent_id).await?;
        Ok(agent.session_id.unwrap_or(session_id))
    }

    /// Atomically add one LLM call's tokens to the cumulative counters.
    pub async fn add_tokens(
        &self,
        agent_id: &str,
        input_tokens: u64,
        output_tokens: u64,
    ) -> Result<(), StoreError> {
        let now = Self::now_bson();
        let result = self
            .col
            .update_one(
                doc! { "agentId": agent_id },
                doc! {
                    "$inc": {
                        "tokenUsage.totalInputTokens": input_tokens as i64,
                        "tokenUsage.totalOutputTokens": output_tokens as i64,
                    },
                    "$set": {
                        "tokenUsage.lastUpdated": now,
                        "lastHeartbeat": now,
                    },
                },
            )
            .await?;
        if result.matched_count == 0 {
            return Err(StoreError::not_found("agent", agent_id));
        }
        debug!(agent_id, input_tokens, output_tokens, "token usage recorded");
        Ok(())
    }

    /// Attach (or detach) the agent to a sandbox.
    pub async fn set_sandbox(
        &self,
        agent_id: &str,
        sandbox_id: Option<&str>,
        sandbox_status: AgentSandboxStatus,
    ) -> Result<(), StoreError> {
        let mut set = doc! { "sandboxStatus": sandbox_status.as_str() };
        match sandbox_id {
            Some(sandbox_id) => set.insert("sandboxId", sandbox_id),
            None => set.insert("sandboxId", bson::Bson::Null),
        };
        let result = self
            .col
            .update_one(doc! { "agentId": agent_id }, doc! { "$set": set })
            .await?;
        if result.matched_count == 0 {
            return Err(StoreError::not_found("agent", agent_id));
        }
        Ok(())
    }

    /// Flip the sandbox status of every agent attached to `sandbox_id`.
    /// Used when the shared sandbox pauses, resumes, or dies.
    pub async fn set_sandbox_status_all(
        &self,
        sandbox_id: &str,
        sandbox_status: AgentSandboxStatus,
    ) -> Result<u64, StoreError> {
        let result = self
            .col
            .update_many(
                doc! { "sandboxId": sandbox_id },
                doc! { "$set": { "sandboxStatus": sandbox_status.as_str() } },
            )
            .await?;
        Ok(result.modified_count)
    }
}

/// Durable session handle: `"session-" + epoch-ms + "-" + 9 base36 chars`.
fn new_session_id() -> String {
    const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..9)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("session-{}-{}", Utc::now().timestamp_millis(), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_shape() {
        let id = new_session_id();
        let parts: Vec<&str> = id.splitn(3, '-').collect();
        assert_eq!(parts[0], "session");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 9);
        assert!(parts[2]
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[test]
    fn test_session_ids_unique() {
        let a = new_session_id();
        let b = new_session_id();
        assert_ne!(a, b);
    }
}

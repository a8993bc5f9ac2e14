//! Append-only checkpoint store.
//!
//! Checkpoints are inserted, never updated. "Latest" means strictly greatest
//! `createdAt` per agent; ties break by checkpoint id so the answer is
//! stable across calls.

use futures::TryStreamExt;
use mongodb::bson::doc;
use mongodb::Collection;
use tracing::debug;

use crate::domain::error::StoreError;
use crate::domain::models::{Checkpoint, CheckpointSummary, ResumePointer};

#[derive(Clone)]
pub struct CheckpointStore {
    col: Collection<Checkpoint>,
}

impl CheckpointStore {
    pub fn new(col: Collection<Checkpoint>) -> Self {
        Self { col }
    }

    /// Append a checkpoint. Rejects records that could not drive a resume.
    pub async fn create(
        &self,
        agent_id: &str,
        summary: CheckpointSummary,
        resume_pointer: ResumePointer,
        tokens_used: u64,
    ) -> Result<Checkpoint, StoreError> {
        let checkpoint = Checkpoint::new(agent_id, summary, resume_pointer, tokens_used);
        checkpoint.validate().map_err(StoreError::Validation)?;
        self.col.insert_one(&checkpoint).await?;
        debug!(
            checkpoint_id = %checkpoint.checkpoint_id,
            agent_id,
            phase = %checkpoint.resume_pointer.phase,
            "checkpoint written"
        );
        Ok(checkpoint)
    }

    /// Most recent checkpoint for the agent, if any.
    pub async fn latest(&self, agent_id: &str) -> Result<Option<Checkpoint>, StoreError> {
        Ok(self
            .col
            .find_one(doc! { "agentId": agent_id })
            .sort(doc! { "createdAt": -1, "checkpointId": -1 })
            .await?)
    }

    /// Render the latest checkpoint into the resume-context text block, or
    /// `None` when the agent has never checkpointed.
    pub async fn build_resume_context(&self, agent_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .latest(agent_id)
            .await?
            .map(|cp| cp.render_resume_context()))
    }

    /// All checkpoints of one agent, oldest first.
    pub async fn for_agent(&self, agent_id: &str) -> Result<Vec<Checkpoint>, StoreError> {
        let cursor = self
            .col
            .find(doc! { "agentId": agent_id })
            .sort(doc! { "createdAt": 1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }
}

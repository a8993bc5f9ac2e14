//! Sandbox tracking store.
//!
//! One record per (sandbox, agent) pair. Pause/resume/kill timestamps are
//! set-once: a timestamp that is already present is never overwritten.

use chrono::Utc;
use futures::TryStreamExt;
use mongodb::bson::doc;
use mongodb::Collection;

use crate::domain::error::StoreError;
use crate::domain::models::{SandboxRecord, SandboxState};

#[derive(Clone)]
pub struct SandboxStore {
    col: Collection<SandboxRecord>,
}

impl SandboxStore {
    pub fn new(col: Collection<SandboxRecord>) -> Self {
        Self { col }
    }

    fn now_bson() -> bson::DateTime {
        bson::DateTime::from_chrono(Utc::now())
    }

    /// Lifecycle timestamp stamped (once) when entering `state`.
    fn timestamp_field(state: SandboxState) -> Option<&'static str> {
        match state {
            SandboxState::Paused => Some("lifecycle.pausedAt"),
            SandboxState::Resuming => Some("lifecycle.resumedAt"),
            SandboxState::Killed => Some("lifecycle.killedAt"),
            SandboxState::Creating | SandboxState::Active => None,
        }
    }

    /// Insert the tracking record for a newly attached agent.
    pub async fn create(&self, record: SandboxRecord) -> Result<SandboxRecord, StoreError> {
        self.col.insert_one(&record).await?;
        Ok(record)
    }

    pub async fn get(
        &self,
        sandbox_id: &str,
        agent_id: &str,
    ) -> Result<SandboxRecord, StoreError> {
        self.col
            .find_one(doc! { "sandboxId": sandbox_id, "agentId": agent_id })
            .await?
            .ok_or_else(|| StoreError::not_found("sandbox", sandbox_id))
    }

    pub async fn list(&self) -> Result<Vec<SandboxRecord>, StoreError> {
        let cursor = self
            .col
            .find(doc! {})
            .sort(doc! { "lifecycle.createdAt": 1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    pub async fn for_sandbox(&self, sandbox_id: &str) -> Result<Vec<SandboxRecord>, StoreError> {
        let cursor = self
            .col
            .find(doc! { "sandboxId": sandbox_id })
            .sort(doc! { "lifecycle.createdAt": 1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    /// Transition every record of `sandbox_id` to `state`, stamping the
    /// matching lifecycle timestamp only where it is still unset.
    pub async fn transition_all(
        &self,
        sandbox_id: &str,
        state: SandboxState,
    ) -> Result<u64, StoreError> {
        let now = Self::now_bson();
        let set = doc! {
            "status": state.as_str(),
            "lifecycle.lastHeartbeat": now,
        };

        // Set-once: stamp the lifecycle timestamp only on records missing it,
        // then apply the status flip to all.
        if let Some(field) = Self::timestamp_field(state) {
            self.col
                .update_many(
                    doc! { "sandboxId": sandbox_id, field: null },
                    doc! { "$set": { field: now } },
                )
                .await?;
        }

        let result = self
            .col
            .update_many(doc! { "sandboxId": sandbox_id }, doc! { "$set": set })
            .await?;
        Ok(result.modified_count)
    }

    /// Transition a single (sandbox, agent) record, with the same set-once
    /// timestamp rules as [`Self::transition_all`].
    pub async fn transition_agent(
        &self,
        sandbox_id: &str,
        agent_id: &str,
        state: SandboxState,
    ) -> Result<(), StoreError> {
        let now = Self::now_bson();
        let set = doc! {
            "status": state.as_str(),
            "lifecycle.lastHeartbeat": now,
        };

        if let Some(field) = Self::timestamp_field(state) {
            self.col
                .update_one(
                    doc! { "sandboxId": sandbox_id, "agentId": agent_id, field: null },
                    doc! { "$set": { field: now } },
                )
                .await?;
        }

        let result = self
            .col
            .update_one(
                doc! { "sandboxId": sandbox_id, "agentId": agent_id },
                doc! { "$set": set },
            )
            .await?;
        if result.matched_count == 0 {
            return Err(StoreError::not_found("sandbox", sandbox_id));
        }
        Ok(())
    }

    /// Record final runtime and cost on kill.
    pub async fn record_costs(
        &self,
        sandbox_id: &str,
        runtime_seconds: f64,
        estimated_cost: f64,
    ) -> Result<(), StoreError> {
        self.col
            .update_many(
                doc! { "sandboxId": sandbox_id },
                doc! { "$set": {
                    "costs.runtimeSeconds": runtime_seconds,
                    "costs.estimatedCost": estimated_cost,
                } },
            )
            .await?;
        Ok(())
    }

    /// Advance the lifecycle heartbeat for every attachment of a sandbox.
    pub async fn heartbeat(&self, sandbox_id: &str) -> Result<(), StoreError> {
        self.col
            .update_many(
                doc! { "sandboxId": sandbox_id },
                doc! { "$set": { "lifecycle.lastHeartbeat": Self::now_bson() } },
            )
            .await?;
        Ok(())
    }
}

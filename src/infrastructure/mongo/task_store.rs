//! Task store with DAG-guarded status transitions.
//!
//! Every transition is expressed as a filtered update so the current status
//! is part of the match: two racing writers cannot both move the same task.

use chrono::Utc;
use futures::TryStreamExt;
use mongodb::bson::doc;
use mongodb::options::ReturnDocument;
use mongodb::Collection;
use tracing::{debug, info};

use crate::domain::error::StoreError;
use crate::domain::models::{Task, TaskStatus};

#[derive(Clone)]
pub struct TaskStore {
    col: Collection<Task>,
}

impl TaskStore {
    pub fn new(col: Collection<Task>) -> Self {
        Self { col }
    }

    fn now_bson() -> bson::DateTime {
        bson::DateTime::from_chrono(Utc::now())
    }

    /// Create a new pending task.
    pub async fn create(
        &self,
        title: &str,
        description: &str,
        parent_task_id: Option<String>,
    ) -> Result<Task, StoreError> {
        if title.trim().is_empty() {
            return Err(StoreError::Validation("task title cannot be empty".into()));
        }
        let task = Task::new(title, description, parent_task_id);
        self.col.insert_one(&task).await?;
        debug!(task_id = %task.task_id, "task created");
        Ok(task)
    }

    pub async fn get(&self, task_id: &str) -> Result<Task, StoreError> {
        self.col
            .find_one(doc! { "taskId": task_id })
            .await?
            .ok_or_else(|| StoreError::not_found("task", task_id))
    }

    /// Assign a pending task to an agent. `assignedTo` is set exactly when
    /// status leaves `pending`.
    pub async fn assign(&self, task_id: &str, agent_id: &str) -> Result<Task, StoreError> {
        let updated = self
            .col
            .find_one_and_update(
                doc! { "taskId": task_id, "status": TaskStatus::Pending.as_str() },
                doc! { "$set": {
                    "assignedTo": agent_id,
                    "status": TaskStatus::Assigned.as_str(),
                    "updatedAt": Self::now_bson(),
                } },
            )
            .return_document(ReturnDocument::After)
            .await?;

        match updated {
            Some(task) => {
                info!(task_id, agent_id, "task assigned");
                Ok(task)
            }
            // Distinguish a missing task from one that already left pending.
            None => {
                let current = self.get(task_id).await?;
                Err(StoreError::TransitionViolation {
                    from: current.status,
                    to: TaskStatus::Assigned,
                })
            }
        }
    }

    /// Move a task along the status DAG, optionally recording a result.
    pub async fn update_status(
        &self,
        task_id: &str,
        new_status: TaskStatus,
        result: Option<String>,
    ) -> Result<Task, StoreError> {
        let current = self.get(task_id).await?;
        if !current.status.can_transition_to(new_status) {
            return Err(StoreError::TransitionViolation {
                from: current.status,
                to: new_status,
            });
        }

        let mut set = doc! {
            "status": new_status.as_str(),
            "updatedAt": Self::now_bson(),
        };
        if let Some(result) = result {
            set.insert("result", result);
        }

        let updated = self
            .col
            .find_one_and_update(
                // Filter on the observed status so a concurrent transition
                // cannot be overwritten.
                doc! { "taskId": task_id, "status": current.status.as_str() },
                doc! { "$set": set },
            )
            .return_document(ReturnDocument::After)
            .await?;

        updated.ok_or(StoreError::TransitionViolation {
            from: current.status,
            to: new_status,
        })
    }

    /// Terminal success from any non-terminal state.
    pub async fn complete(&self, task_id: &str, result: &str) -> Result<Task, StoreError> {
        let updated = self
            .col
            .find_one_and_update(
                doc! {
                    "taskId": task_id,
                    "status": { "$nin": [
                        TaskStatus::Completed.as_str(),
                        TaskStatus::Failed.as_str(),
                    ] },
                },
                doc! { "$set": {
                    "status": TaskStatus::Completed.as_str(),
                    "result": result,
                    "updatedAt": Self::now_bson(),
                } },
            )
            .return_document(ReturnDocument::After)
            .await?;

        match updated {
            Some(task) => Ok(task),
            None => {
                let current = self.get(task_id).await?;
                Err(StoreError::TransitionViolation {
                    from: current.status,
                    to: TaskStatus::Completed,
                })
            }
        }
    }

    /// Terminal failure from any non-terminal state; `reason` lands in `result`.
    pub async fn fail(&self, task_id: &str, reason: &str) -> Result<Task, StoreError> {
        let updated = self
            .col
            .find_one_and_update(
                doc! {
                    "taskId": task_id,
                    "status": { "$nin": [
                        TaskStatus::Completed.as_str(),
                        TaskStatus::Failed.as_str(),
                    ] },
                },
                doc! { "$set": {
                    "status": TaskStatus::Failed.as_str(),
                    "result": reason,
                    "updatedAt": Self::now_bson(),
                } },
            )
            .return_document(ReturnDocument::After)
            .await?;

        match updated {
            Some(task) => Ok(task),
            None => {
                let current = self.get(task_id).await?;
                Err(StoreError::TransitionViolation {
                    from: current.status,
                    to: TaskStatus::Failed,
                })
            }
        }
    }

    /// Atomically claim an assigned (or still pending) task for execution.
    /// Returns `None` when another starter won the race; the change-stream
    /// watcher uses this as its cross-process double-start discriminator.
    pub async fn claim_for_start(&self, task_id: &str) -> Result<Option<Task>, StoreError> {
        Ok(self
            .col
            .find_one_and_update(
                doc! {
                    "taskId": task_id,
                    "status": { "$in": [
                        TaskStatus::Pending.as_str(),
                        TaskStatus::Assigned.as_str(),
                    ] },
                },
                doc! { "$set": {
                    "status": TaskStatus::InProgress.as_str(),
                    "updatedAt": Self::now_bson(),
                } },
            )
            .return_document(ReturnDocument::After)
            .await?)
    }

    /// Tasks assigned to one agent.
    pub async fn for_agent(&self, agent_id: &str) -> Result<Vec<Task>, StoreError> {
        let cursor = self
            .col
            .find(doc! { "assignedTo": agent_id })
            .sort(doc! { "createdAt": 1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    /// Tasks assigned to any of `agent_ids`; used by the director's wait loop.
    pub async fn for_agents(&self, agent_ids: &[String]) -> Result<Vec<Task>, StoreError> {
        let cursor = self
            .col
            .find(doc! { "assignedTo": { "$in": agent_ids.to_vec() } })
            .sort(doc! { "createdAt": 1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    pub async fn list(&self) -> Result<Vec<Task>, StoreError> {
        let cursor = self.col.find(doc! {}).sort(doc! { "createdAt": -1 }).await?;
        Ok(cursor.try_collect().await?)
    }
}

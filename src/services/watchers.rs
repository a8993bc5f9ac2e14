//! Change-stream watchers.
//!
//! Three MongoDB change streams drive reactive behavior: task assignments
//! start specialist processes, message inserts and checkpoint inserts fan
//! out as WebSocket events. A director never starts a specialist process
//! directly; this watcher is the only starter.

use futures::StreamExt;
use mongodb::bson::doc;
use mongodb::change_stream::event::OperationType;
use mongodb::options::FullDocumentType;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::domain::models::{preview_of, AgentType, Task, TaskStatus};
use crate::infrastructure::mongo::{MongoConnection, Stores};
use crate::services::event_bus::{Event, EventBus};
use crate::services::runtime::extract_output;
use crate::services::sandbox_orchestrator::SandboxOrchestrator;

/// How long a watcher loop waits before reopening a broken stream.
const RETRY_DELAY: Duration = Duration::from_secs(5);

pub struct Watchers {
    conn: MongoConnection,
    stores: Stores,
    orchestrator: Arc<SandboxOrchestrator>,
    events: Arc<EventBus>,
    /// In-memory double-start guard: agent ids with a launch in flight.
    starting: Mutex<HashSet<String>>,
}

impl Watchers {
    pub fn new(
        conn: MongoConnection,
        stores: Stores,
        orchestrator: Arc<SandboxOrchestrator>,
        events: Arc<EventBus>,
    ) -> Arc<Self> {
        Arc::new(Self {
            conn,
            stores,
            orchestrator,
            events,
            starting: Mutex::new(HashSet::new()),
        })
    }

    /// Spawn the three watcher loops.
    pub fn spawn(self: Arc<Self>) -> Vec<JoinHandle<()>> {
        vec![
            tokio::spawn(Arc::clone(&self).watch_tasks()),
            tokio::spawn(Arc::clone(&self).watch_messages()),
            tokio::spawn(Arc::clone(&self).watch_checkpoints()),
        ]
    }

    async fn watch_tasks(self: Arc<Self>) {
        let pipeline = vec![doc! { "$match": {
            "operationType": { "$in": ["insert", "update", "replace"] },
            "fullDocument.assignedTo": { "$ne": null },
            "fullDocument.status": { "$in": [
                TaskStatus::Pending.as_str(),
                TaskStatus::Assigned.as_str(),
            ] },
        } }];

        loop {
            let stream = self
                .conn
                .tasks()
                .watch()
                .pipeline(pipeline.clone())
                .full_document(FullDocumentType::UpdateLookup)
                .await;

            let mut stream = match stream {
                Ok(stream) => stream,
                Err(err) => {
                    error!(%err, "task change stream failed to open; retrying");
                    tokio::time::sleep(RETRY_DELAY).await;
                    continue;
                }
            };
            info!("task change stream open");

            while let Some(event) = stream.next().await {
                match event {
                    Ok(change) => {
                        if let Some(task) = change.full_document {
                            Arc::clone(&self).on_task_assigned(task).await;
                        }
                    }
                    Err(err) => {
                        warn!(%err, "task change stream error; reopening");
                        break;
                    }
                }
            }
            tokio::time::sleep(RETRY_DELAY).await;
        }
    }

    /// React to an assigned task: launch the assignee specialist exactly once.
    async fn on_task_assigned(self: Arc<Self>, task: Task) {
        let Some(agent_id) = task.assigned_to.clone() else {
            return;
        };

        let agent = match self.stores.agents.get(&agent_id).await {
            Ok(agent) => agent,
            Err(err) => {
                warn!(%agent_id, %err, "assignee lookup failed");
                return;
            }
        };
        // Directors are run by the API layer; only specialists auto-start.
        if agent.agent_type != AgentType::Specialist || agent.parent_id.is_none() {
            return;
        }
        if self.orchestrator.is_running(&agent_id).await {
            return;
        }

        {
            let mut starting = self.starting.lock().await;
            if !starting.insert(agent_id.clone()) {
                debug!(%agent_id, "launch already in flight");
                return;
            }
        }

        // Starts run in their own task so the watcher loop never blocks on an
        // LLM call.
        tokio::spawn(async move {
            self.start_specialist(agent, task).await;
        });
    }

    async fn start_specialist(self: Arc<Self>, agent: crate::domain::models::AgentRecord, task: Task) {
        let agent_id = agent.agent_id.clone();
        let task_id = task.task_id.clone();

        let result = async {
            // The in_progress transition is the cross-process discriminator:
            // losing this race means someone else started the agent.
            let claimed = self.stores.tasks.claim_for_start(&task_id).await?;
            let Some(claimed) = claimed else {
                debug!(%task_id, "task already claimed; skipping launch");
                return Ok(None);
            };
            self.events.publish(Event::TaskStatus {
                task_id: task_id.clone(),
                status: TaskStatus::InProgress.as_str().to_string(),
            });

            self.orchestrator
                .register(&agent_id, AgentType::Specialist, agent.specialization)
                .await
                .map_err(|e| anyhow::anyhow!(e))?;
            let stdout = self
                .orchestrator
                .run_agent(&agent_id, &claimed.description, agent.parent_id.as_deref())
                .await
                .map_err(|e| anyhow::anyhow!(e))?;
            Ok::<_, anyhow::Error>(Some(stdout))
        }
        .await;

        match result {
            Ok(None) => {}
            Ok(Some(stdout)) => {
                let extracted = extract_output(&stdout, AgentType::Specialist);
                match self.stores.tasks.complete(&task_id, &extracted).await {
                    Ok(_) => {
                        self.events.publish(Event::TaskStatus {
                            task_id: task_id.clone(),
                            status: TaskStatus::Completed.as_str().to_string(),
                        });
                        info!(%agent_id, %task_id, "specialist task completed");
                    }
                    Err(err) => warn!(%task_id, %err, "failed to record task completion"),
                }
            }
            Err(err) => {
                error!(%agent_id, %task_id, %err, "specialist run failed");
                match self
                    .stores
                    .tasks
                    .fail(&task_id, &format!("Error: {err}"))
                    .await
                {
                    Ok(_) => self.events.publish(Event::TaskStatus {
                        task_id: task_id.clone(),
                        status: TaskStatus::Failed.as_str().to_string(),
                    }),
                    Err(store_err) => {
                        warn!(%task_id, %store_err, "failed to record task failure")
                    }
                }
            }
        }

        self.starting.lock().await.remove(&agent_id);
    }

    async fn watch_messages(self: Arc<Self>) {
        let pipeline = vec![doc! { "$match": { "operationType": "insert" } }];

        loop {
            let stream = self.conn.messages().watch().pipeline(pipeline.clone()).await;
            let mut stream = match stream {
                Ok(stream) => stream,
                Err(err) => {
                    error!(%err, "message change stream failed to open; retrying");
                    tokio::time::sleep(RETRY_DELAY).await;
                    continue;
                }
            };
            info!("message change stream open");

            while let Some(event) = stream.next().await {
                match event {
                    Ok(change) => {
                        if change.operation_type != OperationType::Insert {
                            continue;
                        }
                        if let Some(message) = change.full_document {
                            self.events.publish(Event::MessageNew {
                                message_id: message.message_id.clone(),
                                from_agent: message.from_agent.clone(),
                                to_agent: message.to_agent.clone(),
                                message_type: message.message_type.as_str().to_string(),
                                preview: preview_of(&message.content),
                            });
                        }
                    }
                    Err(err) => {
                        warn!(%err, "message change stream error; reopening");
                        break;
                    }
                }
            }
            tokio::time::sleep(RETRY_DELAY).await;
        }
    }

    async fn watch_checkpoints(self: Arc<Self>) {
        let pipeline = vec![doc! { "$match": { "operationType": "insert" } }];

        loop {
            let stream = self
                .conn
                .checkpoints()
                .watch()
                .pipeline(pipeline.clone())
                .await;
            let mut stream = match stream {
                Ok(stream) => stream,
                Err(err) => {
                    error!(%err, "checkpoint change stream failed to open; retrying");
                    tokio::time::sleep(RETRY_DELAY).await;
                    continue;
                }
            };
            info!("checkpoint change stream open");

            while let Some(event) = stream.next().await {
                match event {
                    Ok(change) => {
                        if change.operation_type != OperationType::Insert {
                            continue;
                        }
                        if let Some(checkpoint) = change.full_document {
                            self.events.publish(Event::CheckpointNew {
                                checkpoint_id: checkpoint.checkpoint_id.clone(),
                                agent_id: checkpoint.agent_id.clone(),
                                phase: checkpoint.resume_pointer.phase.clone(),
                                timestamp: checkpoint.created_at,
                            });
                        }
                    }
                    Err(err) => {
                        warn!(%err, "checkpoint change stream error; reopening");
                        break;
                    }
                }
            }
            tokio::time::sleep(RETRY_DELAY).await;
        }
    }
}

//! Sandbox orchestrator.
//!
//! Owns the single shared sandbox and the in-memory map of registered
//! agents. The sandbox is created lazily on first registration, set up once,
//! and destroyed only via `kill_sandbox`. Task text reaches agent processes
//! exclusively through the `AGENT_TASK` environment variable; only
//! UUID-shaped ids and enum values are ever interpolated into a command line.

use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::domain::error::SandboxError;
use crate::domain::models::{
    is_uuid_shaped, AgentSandboxStatus, AgentType, Config, SandboxMetadata, SandboxRecord,
    SandboxResources, SandboxState, Specialization,
};
use crate::domain::ports::{
    CommandOutcome, CommandSpec, OutputHandler, OutputStream, SandboxProvider,
};
use crate::infrastructure::mongo::Stores;
use crate::services::event_bus::{Event, EventBus};

/// Fixed in-sandbox path of the agent runtime bundle.
pub const RUNTIME_LAUNCHER: &str = "opt/squad/run-agent.sh";
const RUNTIME_MANIFEST: &str = "opt/squad/runtime.json";

const LAUNCHER_SCRIPT: &str = "#!/bin/sh\n# Agent runtime entrypoint. Identity arrives as flags, the task via AGENT_TASK.\nexec squad agent \"$@\"\n";

/// Per-agent process status tracked by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Idle,
    Running,
    Completed,
    Error,
    Killed,
}

impl ProcessStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Killed => "killed",
        }
    }
}

struct RegisteredAgent {
    agent_type: AgentType,
    specialization: Option<Specialization>,
    process_status: ProcessStatus,
}

#[derive(Default)]
struct SharedState {
    sandbox_id: Option<String>,
    setup_done: bool,
    created_at: Option<DateTime<Utc>>,
    agents: HashMap<String, RegisteredAgent>,
}

/// Snapshot returned by `GET /api/sandbox/status`.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxStatusReport {
    pub sandbox_id: Option<String>,
    pub is_ready: bool,
    pub agent_count: usize,
    pub agents: Vec<String>,
}

pub struct SandboxOrchestrator {
    provider: Arc<dyn SandboxProvider>,
    stores: Stores,
    events: Arc<EventBus>,
    config: Config,
    state: Mutex<SharedState>,
}

impl SandboxOrchestrator {
    pub fn new(
        provider: Arc<dyn SandboxProvider>,
        stores: Stores,
        events: Arc<EventBus>,
        config: Config,
    ) -> Self {
        Self {
            provider,
            stores,
            events,
            config,
            state: Mutex::new(SharedState::default()),
        }
    }

    fn resources(&self) -> SandboxResources {
        SandboxResources {
            cpu_count: self.config.sandbox.cpu_count,
            memory_mb: self.config.sandbox.memory_mb,
            timeout_ms: self.config.sandbox.timeout_ms,
        }
    }

    /// Register an agent with the shared sandbox, lazily creating and setting
    /// it up on first use. Re-registration of a live agent is a no-op.
    pub async fn register(
        &self,
        agent_id: &str,
        agent_type: AgentType,
        specialization: Option<Specialization>,
    ) -> Result<String, SandboxError> {
        let mut state = self.state.lock().await;

        let sandbox_id = if let Some(id) = state.sandbox_id.clone() {
            id
        } else {
            let sandbox_id = self.provider.create(&self.resources()).await?;
            info!(%sandbox_id, "shared sandbox created");
            state.sandbox_id = Some(sandbox_id.clone());
            state.created_at = Some(Utc::now());
            self.events.publish(Event::SandboxEvent {
                sandbox_id: sandbox_id.clone(),
                action: "created".to_string(),
            });
            sandbox_id
        };

        if !state.setup_done {
            // Upload the runtime bundle and verify it landed. Setup is
            // idempotent; peers registered later skip it entirely.
            self.provider
                .write_file(&sandbox_id, RUNTIME_LAUNCHER, LAUNCHER_SCRIPT)
                .await?;
            let manifest = json!({
                "name": "squad-agent-runtime",
                "entrypoint": RUNTIME_LAUNCHER,
                "version": env!("CARGO_PKG_VERSION"),
            });
            self.provider
                .write_file(&sandbox_id, RUNTIME_MANIFEST, &manifest.to_string())
                .await?;
            let check = self
                .provider
                .exec(
                    &sandbox_id,
                    CommandSpec::new(format!("test -f {RUNTIME_LAUNCHER}")),
                    None,
                )
                .await?;
            if check.is_error() {
                return Err(SandboxError::CreationFailed(
                    "runtime bundle upload verification failed".to_string(),
                ));
            }
            state.setup_done = true;
            info!(%sandbox_id, "sandbox setup complete");
        }

        if !state.agents.contains_key(agent_id) {
            state.agents.insert(
                agent_id.to_string(),
                RegisteredAgent {
                    agent_type,
                    specialization,
                    process_status: ProcessStatus::Idle,
                },
            );

            let record = SandboxRecord::new(
                sandbox_id.clone(),
                agent_id,
                SandboxMetadata {
                    agent_type,
                    specialization,
                    created_by: Some("control-plane".to_string()),
                },
                self.resources(),
            );
            self.stores
                .sandboxes
                .create(record)
                .await
                .map_err(|e| SandboxError::Provider(e.to_string()))?;
            self.stores
                .sandboxes
                .transition_agent(&sandbox_id, agent_id, SandboxState::Active)
                .await
                .map_err(|e| SandboxError::Provider(e.to_string()))?;
            self.stores
                .agents
                .set_sandbox(agent_id, Some(&sandbox_id), AgentSandboxStatus::Active)
                .await
                .map_err(|e| SandboxError::Provider(e.to_string()))?;
        }

        Ok(sandbox_id)
    }

    /// Launch an agent's runtime process and wait for it to exit. Returns
    /// the process stdout on exit 0. Identity goes on the command line
    /// (UUID-shaped, validated); the task body goes through the environment.
    pub async fn run_agent(
        &self,
        agent_id: &str,
        task: &str,
        parent_id: Option<&str>,
    ) -> Result<String, SandboxError> {
        if !is_uuid_shaped(agent_id) {
            return Err(SandboxError::CommandFailed(format!(
                "refusing non-UUID agent id: {agent_id}"
            )));
        }
        if let Some(parent_id) = parent_id {
            if !is_uuid_shaped(parent_id) {
                return Err(SandboxError::CommandFailed(format!(
                    "refusing non-UUID parent id: {parent_id}"
                )));
            }
        }

        let (sandbox_id, agent_type, specialization) = {
            let mut state = self.state.lock().await;
            let sandbox_id = state
                .sandbox_id
                .clone()
                .ok_or_else(|| SandboxError::NotFound("no shared sandbox".to_string()))?;
            let agent = state
                .agents
                .get_mut(agent_id)
                .ok_or_else(|| SandboxError::AgentNotRegistered(agent_id.to_string()))?;
            if agent.process_status == ProcessStatus::Running {
                return Err(SandboxError::AgentAlreadyRunning(agent_id.to_string()));
            }
            agent.process_status = ProcessStatus::Running;
            (sandbox_id, agent.agent_type, agent.specialization)
        };

        let mut command = format!(
            "sh {RUNTIME_LAUNCHER} --agentId {agent_id} --agentType {}",
            agent_type.as_str()
        );
        if let Some(specialization) = specialization {
            command.push_str(&format!(" --specialization {}", specialization.as_str()));
        }
        if let Some(parent_id) = parent_id {
            command.push_str(&format!(" --parentId {parent_id}"));
        }

        let spec = CommandSpec::new(command)
            .with_env("AGENT_TASK", task)
            .with_env("MONGODB_URI", &self.config.mongodb.uri)
            .with_env("MONGODB_DB_NAME", &self.config.mongodb.db_name)
            .with_env("ANTHROPIC_API_KEY", &self.config.claude.api_key)
            .with_timeout(Duration::from_millis(self.config.sandbox.timeout_ms));

        let events = Arc::clone(&self.events);
        let output_agent = agent_id.to_string();
        let handler: OutputHandler = Arc::new(move |stream: OutputStream, chunk: &str| {
            events.publish(Event::AgentOutput {
                agent_id: output_agent.clone(),
                stream: stream.as_str().to_string(),
                content: chunk.to_string(),
            });
        });

        let result = self.provider.exec(&sandbox_id, spec, Some(handler)).await;

        let mut state = self.state.lock().await;
        let agent = state.agents.get_mut(agent_id);
        match &result {
            Ok(outcome) => {
                if let Some(agent) = agent {
                    // A kill that raced the exit keeps its `killed` marker.
                    if agent.process_status == ProcessStatus::Running {
                        agent.process_status = if outcome.is_error() {
                            ProcessStatus::Error
                        } else {
                            ProcessStatus::Completed
                        };
                    }
                }
            }
            Err(_) => {
                if let Some(agent) = agent {
                    if agent.process_status == ProcessStatus::Running {
                        agent.process_status = ProcessStatus::Error;
                    }
                }
            }
        }
        drop(state);

        let outcome = result?;
        if outcome.timed_out {
            return Err(SandboxError::CommandTimeout {
                timeout_ms: self.config.sandbox.timeout_ms,
            });
        }
        if outcome.exit_code != 0 {
            let detail = outcome.stderr.lines().last().unwrap_or("").to_string();
            return Err(SandboxError::CommandFailed(format!(
                "agent process exited with {}: {detail}",
                outcome.exit_code
            )));
        }
        Ok(outcome.stdout)
    }

    /// One-shot command execution in the shared sandbox on behalf of an
    /// agent. Timeouts are classified distinctly via `timed_out`.
    pub async fn execute(
        &self,
        agent_id: &str,
        command: &str,
        cwd: Option<String>,
        env: HashMap<String, String>,
        timeout: Option<Duration>,
        output: Option<OutputHandler>,
    ) -> Result<CommandOutcome, SandboxError> {
        let sandbox_id = {
            let state = self.state.lock().await;
            if !state.agents.contains_key(agent_id) {
                return Err(SandboxError::AgentNotRegistered(agent_id.to_string()));
            }
            state
                .sandbox_id
                .clone()
                .ok_or_else(|| SandboxError::NotFound("no shared sandbox".to_string()))?
        };

        let spec = CommandSpec {
            command: command.to_string(),
            cwd,
            env,
            timeout,
        };
        self.provider.exec(&sandbox_id, spec, output).await
    }

    /// Kill one agent's process, best-effort, leaving the sandbox alive for
    /// peers. The agent's record moves to `completed` with sandbox status
    /// `killed`; its in-flight task is left in place for checkpoint resume.
    pub async fn kill(&self, agent_id: &str) -> Result<(), SandboxError> {
        let sandbox_id = {
            let mut state = self.state.lock().await;
            let sandbox_id = state
                .sandbox_id
                .clone()
                .ok_or_else(|| SandboxError::NotFound("no shared sandbox".to_string()))?;
            let agent = state
                .agents
                .get_mut(agent_id)
                .ok_or_else(|| SandboxError::AgentNotRegistered(agent_id.to_string()))?;
            agent.process_status = ProcessStatus::Killed;
            sandbox_id
        };

        self.provider.signal_matching(&sandbox_id, agent_id).await?;

        if let Err(err) = self
            .stores
            .agents
            .update_status(agent_id, crate::domain::models::AgentStatus::Completed, None)
            .await
        {
            warn!(agent_id, %err, "failed to update killed agent status");
        }
        if let Err(err) = self
            .stores
            .agents
            .set_sandbox(agent_id, Some(&sandbox_id), AgentSandboxStatus::Killed)
            .await
        {
            warn!(agent_id, %err, "failed to update killed agent sandbox status");
        }
        if let Err(err) = self
            .stores
            .sandboxes
            .transition_agent(&sandbox_id, agent_id, SandboxState::Killed)
            .await
        {
            warn!(agent_id, %err, "failed to transition sandbox record");
        }

        self.events.publish(Event::AgentKilled {
            agent_id: agent_id.to_string(),
        });
        info!(agent_id, "agent killed");
        Ok(())
    }

    /// Pause the entire shared sandbox. Every attached agent pauses with it.
    pub async fn pause(&self) -> Result<(), SandboxError> {
        let sandbox_id = self.require_sandbox().await?;
        self.provider.pause(&sandbox_id).await?;

        self.flip_all(&sandbox_id, SandboxState::Paused, AgentSandboxStatus::Paused)
            .await;
        self.events.publish(Event::SandboxEvent {
            sandbox_id,
            action: "paused".to_string(),
        });
        Ok(())
    }

    /// Resume a paused sandbox.
    pub async fn resume(&self) -> Result<(), SandboxError> {
        let sandbox_id = self.require_sandbox().await?;
        self.provider.resume(&sandbox_id).await?;

        // Resuming stamps resumedAt once; Active is the settled state.
        if let Err(err) = self
            .stores
            .sandboxes
            .transition_all(&sandbox_id, SandboxState::Resuming)
            .await
        {
            warn!(%err, "failed to record resuming transition");
        }
        self.flip_all(&sandbox_id, SandboxState::Active, AgentSandboxStatus::Active)
            .await;
        self.events.publish(Event::SandboxEvent {
            sandbox_id,
            action: "resumed".to_string(),
        });
        Ok(())
    }

    /// Kill the shared sandbox: mark every attached agent killed, record
    /// final costs, tear down the remote sandbox, and reset in-memory state.
    pub async fn kill_sandbox(&self) -> Result<(), SandboxError> {
        let (sandbox_id, created_at, agent_ids) = {
            let mut state = self.state.lock().await;
            let sandbox_id = state
                .sandbox_id
                .clone()
                .ok_or_else(|| SandboxError::NotFound("no shared sandbox".to_string()))?;
            let agent_ids: Vec<String> = state.agents.keys().cloned().collect();
            for agent in state.agents.values_mut() {
                agent.process_status = ProcessStatus::Killed;
            }
            let created_at = state.created_at;
            *state = SharedState::default();
            (sandbox_id, created_at, agent_ids)
        };

        let runtime_seconds = created_at
            .map(|t| (Utc::now() - t).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0);
        let estimated_cost = runtime_seconds * self.config.sandbox.cost_per_second;

        if let Err(err) = self
            .stores
            .sandboxes
            .record_costs(&sandbox_id, runtime_seconds, estimated_cost)
            .await
        {
            warn!(%err, "failed to record sandbox costs");
        }
        self.flip_all(&sandbox_id, SandboxState::Killed, AgentSandboxStatus::Killed)
            .await;

        self.provider.destroy(&sandbox_id).await?;

        for agent_id in agent_ids {
            self.events.publish(Event::AgentKilled { agent_id });
        }
        self.events.publish(Event::SandboxEvent {
            sandbox_id: sandbox_id.clone(),
            action: "killed".to_string(),
        });
        info!(%sandbox_id, "shared sandbox killed");
        Ok(())
    }

    /// Whether this agent currently has a running process.
    pub async fn is_running(&self, agent_id: &str) -> bool {
        let state = self.state.lock().await;
        state
            .agents
            .get(agent_id)
            .map(|a| a.process_status == ProcessStatus::Running)
            .unwrap_or(false)
    }

    /// The shared sandbox id, if one exists.
    pub async fn sandbox_id(&self) -> Option<String> {
        self.state.lock().await.sandbox_id.clone()
    }

    pub async fn status(&self) -> SandboxStatusReport {
        let state = self.state.lock().await;
        SandboxStatusReport {
            sandbox_id: state.sandbox_id.clone(),
            is_ready: state.sandbox_id.is_some() && state.setup_done,
            agent_count: state.agents.len(),
            agents: state.agents.keys().cloned().collect(),
        }
    }

    async fn require_sandbox(&self) -> Result<String, SandboxError> {
        self.state
            .lock()
            .await
            .sandbox_id
            .clone()
            .ok_or_else(|| SandboxError::NotFound("no shared sandbox".to_string()))
    }

    /// Propagate a sandbox-wide state flip to both collections; failures are
    /// logged, not fatal, so teardown always finishes.
    async fn flip_all(
        &self,
        sandbox_id: &str,
        state: SandboxState,
        agent_status: AgentSandboxStatus,
    ) {
        if let Err(err) = self.stores.sandboxes.transition_all(sandbox_id, state).await {
            warn!(sandbox_id, %err, "failed to transition sandbox records");
        }
        if let Err(err) = self
            .stores
            .agents
            .set_sandbox_status_all(sandbox_id, agent_status)
            .await
        {
            warn!(sandbox_id, %err, "failed to flip agent sandbox statuses");
        }
    }
}

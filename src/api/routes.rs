//! REST surface of the control plane.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use super::error::ApiError;
use super::state::AppState;
use super::ws;
use crate::domain::error::SandboxError;
use crate::domain::models::{
    AgentRecord, AgentStatus, AgentType, Specialization, TaskStatus,
};
use crate::services::event_bus::Event;
use crate::services::runtime::extract_output;
use crate::services::views::{agent_json, checkpoint_json, message_json, sandbox_json, task_json};

/// Build the full router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/agents", get(list_agents).post(create_agent))
        .route("/api/agents/:id", delete(kill_agent))
        .route("/api/agents/:id/status", get(agent_status))
        .route("/api/agents/:id/task", post(submit_task))
        .route("/api/agents/:id/restart", post(restart_agent))
        .route("/api/sandboxes", get(list_sandboxes))
        .route("/api/sandboxes/:id", get(get_sandbox).delete(kill_sandbox_by_id))
        .route("/api/sandboxes/:id/pause", post(pause_sandbox))
        .route("/api/sandboxes/:id/resume", post(resume_sandbox))
        .route("/api/sandbox", delete(kill_shared_sandbox))
        .route("/api/sandbox/status", get(sandbox_status))
        .route("/api/tasks", get(list_tasks))
        .route("/api/tasks/:id", get(get_task))
        .route("/api/messages", get(list_messages))
        .route("/ws", get(ws::handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn list_agents(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let agents = state.stores.agents.list(None, None).await?;
    Ok(Json(Value::Array(agents.iter().map(agent_json).collect())))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateAgentBody {
    #[serde(rename = "type")]
    agent_type: String,
    parent_id: Option<String>,
    specialization: Option<String>,
}

async fn create_agent(
    State(state): State<AppState>,
    Json(body): Json<CreateAgentBody>,
) -> Result<impl IntoResponse, ApiError> {
    let agent_type = AgentType::parse_str(&body.agent_type)
        .ok_or_else(|| ApiError::validation(format!("unknown agent type: {}", body.agent_type)))?;

    let agent = match agent_type {
        AgentType::Director => AgentRecord::director(),
        AgentType::Specialist => {
            let parent_id = body
                .parent_id
                .ok_or_else(|| ApiError::validation("specialist requires parentId"))?;
            let specialization = match body.specialization.as_deref() {
                Some(s) => Specialization::parse_str(s).ok_or_else(|| {
                    ApiError::validation(format!("unknown specialization: {s}"))
                })?,
                None => Specialization::General,
            };
            AgentRecord::specialist(parent_id, specialization)
        }
    };

    let agent = state.stores.agents.register(agent).await?;
    state.events.publish(Event::AgentCreated {
        agent_id: agent.agent_id.clone(),
        agent_type: agent.agent_type.as_str().to_string(),
        parent_id: agent.parent_id.clone(),
    });
    Ok((StatusCode::CREATED, Json(agent_json(&agent))))
}

/// Agent record plus its latest checkpoint, so a UI can label a resumable
/// agent without a second round trip.
async fn agent_status(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let agent = state.stores.agents.get(&agent_id).await?;
    let latest = state.stores.checkpoints.latest(&agent_id).await?;

    let mut view = agent_json(&agent);
    view["latestCheckpoint"] = match latest {
        Some(checkpoint) => checkpoint_json(&checkpoint),
        None => Value::Null,
    };
    Ok(Json(view))
}

#[derive(Deserialize)]
struct SubmitTaskBody {
    task: String,
}

/// Create a task, assign it to the agent, and run the director runtime in
/// the background. The response does not wait for the run.
async fn submit_task(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    Json(body): Json<SubmitTaskBody>,
) -> Result<Json<Value>, ApiError> {
    if body.task.trim().is_empty() {
        return Err(ApiError::validation("task cannot be empty"));
    }
    let agent = state.stores.agents.get(&agent_id).await?;

    let task = state
        .stores
        .tasks
        .create(&task_title(&body.task), &body.task, None)
        .await?;
    state.stores.tasks.assign(&task.task_id, &agent_id).await?;
    state.events.publish(Event::TaskCreated {
        task_id: task.task_id.clone(),
        title: task.title.clone(),
    });
    state.events.publish(Event::TaskStatus {
        task_id: task.task_id.clone(),
        status: TaskStatus::Assigned.as_str().to_string(),
    });

    let task_id = task.task_id.clone();
    let task_text = body.task.clone();
    tokio::spawn(async move {
        run_director(state, agent, task_id, task_text).await;
    });

    Ok(Json(json!({
        "taskId": task.task_id,
        "status": "assigned",
        "agentId": agent_id,
    })))
}

/// Background director run driven by the API layer (specialists are started
/// by the change-stream watcher instead).
async fn run_director(state: AppState, agent: AgentRecord, task_id: String, task_text: String) {
    let agent_id = agent.agent_id.clone();
    let result = async {
        state
            .orchestrator
            .register(&agent_id, agent.agent_type, agent.specialization)
            .await?;
        let claimed = state.stores.tasks.claim_for_start(&task_id).await
            .map_err(|e| SandboxError::Provider(e.to_string()))?;
        if claimed.is_none() {
            return Ok(None);
        }
        state.events.publish(Event::TaskStatus {
            task_id: task_id.clone(),
            status: TaskStatus::InProgress.as_str().to_string(),
        });
        state
            .orchestrator
            .run_agent(&agent_id, &task_text, None)
            .await
            .map(Some)
    }
    .await;

    match result {
        Ok(None) => {}
        Ok(Some(stdout)) => {
            let extracted = extract_output(&stdout, AgentType::Director);
            match state.stores.tasks.complete(&task_id, &extracted).await {
                Ok(_) => {
                    state.events.publish(Event::TaskStatus {
                        task_id,
                        status: TaskStatus::Completed.as_str().to_string(),
                    });
                    info!(%agent_id, "director run completed");
                }
                Err(err) => error!(%task_id, %err, "failed to record director result"),
            }
        }
        Err(err) => {
            error!(%agent_id, %task_id, %err, "director run failed");
            match state
                .stores
                .tasks
                .fail(&task_id, &format!("Error: {err}"))
                .await
            {
                Ok(_) => state.events.publish(Event::TaskStatus {
                    task_id,
                    status: TaskStatus::Failed.as_str().to_string(),
                }),
                Err(store_err) => error!(%task_id, %store_err, "failed to record task failure"),
            }
        }
    }
}

/// Kill an agent's process and mark it killed. Its in-flight task is left in
/// place for checkpoint resume.
async fn kill_agent(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.stores.agents.get(&agent_id).await?;

    match state.orchestrator.kill(&agent_id).await {
        Ok(()) => {}
        // Never launched: there is no process to kill, only state to settle.
        Err(SandboxError::NotFound(_)) | Err(SandboxError::AgentNotRegistered(_)) => {
            state
                .stores
                .agents
                .update_status(&agent_id, AgentStatus::Completed, None)
                .await?;
            state.events.publish(Event::AgentKilled {
                agent_id: agent_id.clone(),
            });
        }
        Err(err) => return Err(err.into()),
    }

    Ok(Json(json!({
        "agentId": agent_id,
        "status": "killed",
        "checkpointId": null,
    })))
}

/// Reset an agent to `idle`, preserving sandbox state and checkpoints. The
/// next run injects the rendered resume context.
async fn restart_agent(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let agent = state
        .stores
        .agents
        .update_status(&agent_id, AgentStatus::Idle, None)
        .await?;
    state.events.publish(Event::AgentStatus {
        agent_id: agent.agent_id.clone(),
        status: agent.status.as_str().to_string(),
    });
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "agentId": agent.agent_id,
            "status": agent.status.as_str(),
        })),
    ))
}

async fn list_sandboxes(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let records = state.stores.sandboxes.list().await?;
    Ok(Json(Value::Array(records.iter().map(sandbox_json).collect())))
}

async fn get_sandbox(
    State(state): State<AppState>,
    Path(sandbox_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let records = state.stores.sandboxes.for_sandbox(&sandbox_id).await?;
    if records.is_empty() {
        return Err(ApiError::not_found(format!("sandbox not found: {sandbox_id}")));
    }
    Ok(Json(Value::Array(records.iter().map(sandbox_json).collect())))
}

/// Resolve `:id` against the single shared sandbox.
async fn require_shared(state: &AppState, sandbox_id: &str) -> Result<(), ApiError> {
    match state.orchestrator.sandbox_id().await {
        Some(shared) if shared == sandbox_id => Ok(()),
        _ => Err(ApiError::not_found(format!("sandbox not found: {sandbox_id}"))),
    }
}

async fn pause_sandbox(
    State(state): State<AppState>,
    Path(sandbox_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    require_shared(&state, &sandbox_id).await?;
    state.orchestrator.pause().await?;
    Ok(Json(json!({ "sandboxId": sandbox_id, "status": "paused" })))
}

async fn resume_sandbox(
    State(state): State<AppState>,
    Path(sandbox_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    require_shared(&state, &sandbox_id).await?;
    state.orchestrator.resume().await?;
    Ok(Json(json!({ "sandboxId": sandbox_id, "status": "active" })))
}

async fn kill_sandbox_by_id(
    State(state): State<AppState>,
    Path(sandbox_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    require_shared(&state, &sandbox_id).await?;
    state.orchestrator.kill_sandbox().await?;
    Ok(Json(json!({ "sandboxId": sandbox_id, "status": "killed" })))
}

/// Kill the shared sandbox and every attached agent.
async fn kill_shared_sandbox(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let sandbox_id = state
        .orchestrator
        .sandbox_id()
        .await
        .ok_or_else(|| ApiError::not_found("no shared sandbox"))?;
    state.orchestrator.kill_sandbox().await?;
    Ok(Json(json!({ "sandboxId": sandbox_id, "status": "killed" })))
}

async fn sandbox_status(State(state): State<AppState>) -> Json<Value> {
    let report = state.orchestrator.status().await;
    Json(json!({
        "sandboxId": report.sandbox_id,
        "isReady": report.is_ready,
        "agentCount": report.agent_count,
        "agents": report.agents,
    }))
}

async fn list_tasks(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let tasks = state.stores.tasks.list().await?;
    Ok(Json(Value::Array(tasks.iter().map(task_json).collect())))
}

async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let task = state.stores.tasks.get(&task_id).await?;
    Ok(Json(task_json(&task)))
}

#[derive(Deserialize)]
struct ListMessagesQuery {
    limit: Option<i64>,
}

async fn list_messages(
    State(state): State<AppState>,
    Query(query): Query<ListMessagesQuery>,
) -> Result<Json<Value>, ApiError> {
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let messages = state.stores.messages.recent(limit).await?;
    Ok(Json(Value::Array(
        messages.iter().map(message_json).collect(),
    )))
}

/// Short task title derived from the raw task text.
fn task_title(task: &str) -> String {
    let first_line = task.lines().next().unwrap_or(task).trim();
    let mut chars = first_line.char_indices();
    match chars.nth(80) {
        Some((boundary, _)) => format!("{}...", &first_line[..boundary]),
        None => first_line.to_string(),
    }
}

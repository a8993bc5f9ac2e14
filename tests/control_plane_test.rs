//! Integration tests for the sandbox orchestrator and the REST surface,
//! using the local process provider and a throwaway database.

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::TestDb;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use squad::api::{router, AppState};
use squad::domain::models::{AgentRecord, AgentSandboxStatus, AgentType, Config, SandboxState};
use squad::infrastructure::sandbox::LocalProcessSandbox;
use squad::services::event_bus::EventBus;
use squad::services::sandbox_orchestrator::SandboxOrchestrator;

struct Harness {
    db: TestDb,
    orchestrator: Arc<SandboxOrchestrator>,
    events: Arc<EventBus>,
    _workspace: tempfile::TempDir,
}

impl Harness {
    async fn new() -> Option<Self> {
        let db = TestDb::connect().await?;
        let workspace = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.sandbox.workspace_dir = workspace.path().to_string_lossy().into_owned();

        let events = Arc::new(EventBus::default());
        let provider = Arc::new(LocalProcessSandbox::new(workspace.path()));
        let orchestrator = Arc::new(SandboxOrchestrator::new(
            provider,
            db.stores.clone(),
            Arc::clone(&events),
            config,
        ));
        Some(Self {
            db,
            orchestrator,
            events,
            _workspace: workspace,
        })
    }

    fn app(&self) -> axum::Router {
        router(AppState {
            config: Config::default(),
            stores: self.db.stores.clone(),
            orchestrator: Arc::clone(&self.orchestrator),
            events: Arc::clone(&self.events),
        })
    }

    async fn teardown(self) {
        self.db.teardown().await;
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_shared_sandbox_lazy_creation_and_reuse() {
    let Some(harness) = Harness::new().await else { return };

    let report = harness.orchestrator.status().await;
    assert!(!report.is_ready);

    let director = harness
        .db
        .stores
        .agents
        .register(AgentRecord::director())
        .await
        .unwrap();
    let first = harness
        .orchestrator
        .register(&director.agent_id, AgentType::Director, None)
        .await
        .unwrap();

    let peer = harness
        .db
        .stores
        .agents
        .register(AgentRecord::director())
        .await
        .unwrap();
    let second = harness
        .orchestrator
        .register(&peer.agent_id, AgentType::Director, None)
        .await
        .unwrap();

    // One shared sandbox, set up once.
    assert_eq!(first, second);
    let report = harness.orchestrator.status().await;
    assert!(report.is_ready);
    assert_eq!(report.agent_count, 2);

    // Both attachments are tracked and active.
    let records = harness.db.stores.sandboxes.for_sandbox(&first).await.unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.status == SandboxState::Active));

    let agent = harness.db.stores.agents.get(&director.agent_id).await.unwrap();
    assert_eq!(agent.sandbox_status, AgentSandboxStatus::Active);
    assert_eq!(agent.sandbox_id.as_deref(), Some(first.as_str()));

    harness.teardown().await;
}

#[tokio::test]
async fn test_execute_streams_and_classifies_timeout() {
    let Some(harness) = Harness::new().await else { return };

    let director = harness
        .db
        .stores
        .agents
        .register(AgentRecord::director())
        .await
        .unwrap();
    harness
        .orchestrator
        .register(&director.agent_id, AgentType::Director, None)
        .await
        .unwrap();

    let outcome = harness
        .orchestrator
        .execute(
            &director.agent_id,
            "echo hello from the sandbox",
            None,
            HashMap::new(),
            None,
            None,
        )
        .await
        .unwrap();
    assert_eq!(outcome.exit_code, 0);
    assert!(outcome.stdout.contains("hello from the sandbox"));
    assert!(!outcome.timed_out);

    let timed_out = harness
        .orchestrator
        .execute(
            &director.agent_id,
            "sleep 5",
            None,
            HashMap::new(),
            Some(std::time::Duration::from_millis(200)),
            None,
        )
        .await
        .unwrap();
    assert!(timed_out.timed_out);
    assert!(timed_out.is_error());

    harness.teardown().await;
}

#[tokio::test]
async fn test_kill_sandbox_marks_everything_killed() {
    let Some(harness) = Harness::new().await else { return };

    let director = harness
        .db
        .stores
        .agents
        .register(AgentRecord::director())
        .await
        .unwrap();
    let sandbox_id = harness
        .orchestrator
        .register(&director.agent_id, AgentType::Director, None)
        .await
        .unwrap();

    harness.orchestrator.kill_sandbox().await.unwrap();

    let records = harness.db.stores.sandboxes.for_sandbox(&sandbox_id).await.unwrap();
    assert!(records.iter().all(|r| r.status == SandboxState::Killed));
    assert!(records.iter().all(|r| r.lifecycle.killed_at.is_some()));

    let agent = harness.db.stores.agents.get(&director.agent_id).await.unwrap();
    assert_eq!(agent.sandbox_status, AgentSandboxStatus::Killed);

    // The orchestrator state is released; a fresh register creates anew.
    assert!(harness.orchestrator.sandbox_id().await.is_none());

    harness.teardown().await;
}

#[tokio::test]
async fn test_health_endpoint() {
    let Some(harness) = Harness::new().await else { return };

    let response = harness
        .app()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert!(body.get("timestamp").is_some());
    assert!(body.get("version").is_some());

    harness.teardown().await;
}

#[tokio::test]
async fn test_create_agent_and_status_round_trip() {
    let Some(harness) = Harness::new().await else { return };
    let app = harness.app();

    let response = app
        .clone()
        .oneshot(
            Request::post("/api/agents")
                .header("content-type", "application/json")
                .body(Body::from(json!({ "type": "director" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    let agent_id = created["agentId"].as_str().unwrap();
    assert_eq!(created["status"], "idle");

    let response = app
        .clone()
        .oneshot(
            Request::get(format!("/api/agents/{agent_id}/status"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let status = body_json(response).await;
    assert_eq!(status["agentId"], agent_id);
    assert_eq!(status["tokenUsage"]["totalInputTokens"], 0);
    // No checkpoint yet, so nothing to resume from.
    assert!(status["latestCheckpoint"].is_null());

    harness.teardown().await;
}

#[tokio::test]
async fn test_agent_status_includes_latest_checkpoint() {
    let Some(harness) = Harness::new().await else { return };

    let director = harness
        .db
        .stores
        .agents
        .register(AgentRecord::director())
        .await
        .unwrap();
    harness
        .db
        .stores
        .checkpoints
        .create(
            &director.agent_id,
            squad::domain::models::CheckpointSummary {
                goal: "coordinate the team".to_string(),
                ..Default::default()
            },
            squad::domain::models::ResumePointer {
                next_action: "assign tasks".to_string(),
                phase: "spawning".to_string(),
                current_context: None,
            },
            12,
        )
        .await
        .unwrap();

    let response = harness
        .app()
        .oneshot(
            Request::get(format!("/api/agents/{}/status", director.agent_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let status = body_json(response).await;
    let checkpoint = &status["latestCheckpoint"];
    assert_eq!(checkpoint["agentId"], director.agent_id.as_str());
    assert_eq!(checkpoint["resumePointer"]["phase"], "spawning");
    assert_eq!(checkpoint["tokensUsed"], 12);

    harness.teardown().await;
}

#[tokio::test]
async fn test_error_body_shape_on_unknown_agent() {
    let Some(harness) = Harness::new().await else { return };

    let response = harness
        .app()
        .oneshot(
            Request::get("/api/agents/ghost/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = body_json(response).await;
    assert_eq!(body["error"], "not_found");
    assert_eq!(body["statusCode"], 404);
    assert!(body["message"].as_str().unwrap().contains("ghost"));

    harness.teardown().await;
}

#[tokio::test]
async fn test_create_specialist_requires_parent() {
    let Some(harness) = Harness::new().await else { return };

    let response = harness
        .app()
        .oneshot(
            Request::post("/api/agents")
                .header("content-type", "application/json")
                .body(Body::from(json!({ "type": "specialist" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["error"], "validation_error");

    harness.teardown().await;
}

#[tokio::test]
async fn test_submit_task_responds_assigned() {
    let Some(harness) = Harness::new().await else { return };
    let app = harness.app();

    let director = harness
        .db
        .stores
        .agents
        .register(AgentRecord::director())
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(
            Request::post(format!("/api/agents/{}/task", director.agent_id))
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({ "task": "Research MongoDB agent coordination patterns" }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "assigned");
    assert_eq!(body["agentId"], director.agent_id.as_str());
    let task_id = body["taskId"].as_str().unwrap();

    let task = harness.db.stores.tasks.get(task_id).await.unwrap();
    assert_eq!(task.assigned_to.as_deref(), Some(director.agent_id.as_str()));

    harness.teardown().await;
}

#[tokio::test]
async fn test_kill_and_restart_agent() {
    let Some(harness) = Harness::new().await else { return };
    let app = harness.app();

    let director = harness
        .db
        .stores
        .agents
        .register(AgentRecord::director())
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(
            Request::delete(format!("/api/agents/{}", director.agent_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "killed");
    assert!(body["checkpointId"].is_null());

    let record = harness.db.stores.agents.get(&director.agent_id).await.unwrap();
    assert_eq!(record.status, squad::domain::models::AgentStatus::Completed);

    // Restart reverts to idle without touching checkpoints.
    let response = app
        .clone()
        .oneshot(
            Request::post(format!("/api/agents/{}/restart", director.agent_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["status"], "idle");

    harness.teardown().await;
}

#[tokio::test]
async fn test_sandbox_status_endpoint() {
    let Some(harness) = Harness::new().await else { return };

    let response = harness
        .app()
        .oneshot(Request::get("/api/sandbox/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["isReady"], false);
    assert_eq!(body["agentCount"], 0);

    harness.teardown().await;
}

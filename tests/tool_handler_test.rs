//! Integration tests for the coordination tool set against real stores.

mod common;

use std::sync::{Arc, Mutex};

use common::TestDb;
use serde_json::json;
use squad::domain::error::RuntimeError;
use squad::domain::models::{AgentRecord, Specialization};
use squad::domain::ports::ToolHandler;
use squad::services::tools::{CoordinationTools, ToolObserver};

#[tokio::test]
async fn test_spawn_specialist_is_director_only() {
    let Some(db) = TestDb::connect().await else { return };

    let director = db.stores.agents.register(AgentRecord::director()).await.unwrap();
    let director_tools =
        CoordinationTools::new(director.agent_id.clone(), true, db.stores.clone());

    let spawned = director_tools
        .call("spawnSpecialist", json!({ "specialization": "researcher" }))
        .await
        .unwrap();
    let specialist_id = spawned["agentId"].as_str().unwrap().to_string();

    let record = db.stores.agents.get(&specialist_id).await.unwrap();
    assert_eq!(record.parent_id.as_deref(), Some(director.agent_id.as_str()));
    assert_eq!(record.specialization, Some(Specialization::Researcher));

    // The same tool from a specialist identity is rejected.
    let specialist_tools = CoordinationTools::new(specialist_id, false, db.stores.clone());
    let err = specialist_tools
        .call("spawnSpecialist", json!({ "specialization": "writer" }))
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::DirectorOnly(_)));

    db.teardown().await;
}

#[tokio::test]
async fn test_check_inbox_exposes_previews_only() {
    let Some(db) = TestDb::connect().await else { return };

    let director = db.stores.agents.register(AgentRecord::director()).await.unwrap();
    let specialist = db
        .stores
        .agents
        .register(AgentRecord::specialist(
            director.agent_id.clone(),
            Specialization::General,
        ))
        .await
        .unwrap();

    let long_content = "y".repeat(400);
    db.stores
        .messages
        .send(
            &director.agent_id,
            &specialist.agent_id,
            &long_content,
            squad::domain::models::MessageType::Task,
            None,
            None,
        )
        .await
        .unwrap();

    let tools = CoordinationTools::new(specialist.agent_id.clone(), false, db.stores.clone());
    let previews = tools.call("checkInbox", json!({})).await.unwrap();
    let previews = previews.as_array().unwrap();
    assert_eq!(previews.len(), 1);
    let preview = &previews[0];
    assert_eq!(preview["preview"].as_str().unwrap().chars().count(), 53);
    assert!(preview.get("content").is_none(), "full content must not leak");

    // Full fidelity costs an explicit read, which marks the message read.
    let message_id = preview["messageId"].as_str().unwrap();
    let full = tools
        .call("readMessage", json!({ "messageId": message_id }))
        .await
        .unwrap();
    assert_eq!(full["content"].as_str().unwrap(), long_content);
    assert!(!full["readAt"].is_null());

    let remaining = tools.call("checkInbox", json!({})).await.unwrap();
    assert!(remaining.as_array().unwrap().is_empty());

    db.teardown().await;
}

#[tokio::test]
async fn test_send_message_validates_recipient() {
    let Some(db) = TestDb::connect().await else { return };

    let director = db.stores.agents.register(AgentRecord::director()).await.unwrap();
    let tools = CoordinationTools::new(director.agent_id.clone(), true, db.stores.clone());

    let err = tools
        .call(
            "sendMessage",
            json!({ "toAgentId": "no-such-agent", "content": "hi", "type": "status" }),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::Store(_)));

    let ok = tools
        .call(
            "sendMessage",
            json!({ "toAgentId": director.agent_id, "content": "note to self", "type": "status" }),
        )
        .await
        .unwrap();
    assert!(ok.get("messageId").is_some());
    assert!(ok.get("threadId").is_some());

    db.teardown().await;
}

#[tokio::test]
async fn test_task_tools_round_trip() {
    let Some(db) = TestDb::connect().await else { return };

    let director = db.stores.agents.register(AgentRecord::director()).await.unwrap();
    let tools = CoordinationTools::new(director.agent_id.clone(), true, db.stores.clone());

    let created = tools
        .call(
            "createTask",
            json!({ "title": "Find docs", "description": "search the archive" }),
        )
        .await
        .unwrap();
    let task_id = created["taskId"].as_str().unwrap();
    assert_eq!(created["status"], "pending");

    let assigned = tools
        .call(
            "assignTask",
            json!({ "taskId": task_id, "agentId": director.agent_id }),
        )
        .await
        .unwrap();
    assert_eq!(assigned["status"], "assigned");

    let completed = tools
        .call(
            "completeTask",
            json!({ "taskId": task_id, "result": "archive indexed" }),
        )
        .await
        .unwrap();
    assert_eq!(completed["status"], "completed");

    let snapshot = tools
        .call("getTaskStatus", json!({ "taskId": task_id }))
        .await
        .unwrap();
    assert_eq!(snapshot["result"], "archive indexed");

    db.teardown().await;
}

#[tokio::test]
async fn test_checkpoint_tool_stamps_cumulative_tokens() {
    let Some(db) = TestDb::connect().await else { return };

    let director = db.stores.agents.register(AgentRecord::director()).await.unwrap();
    db.stores.agents.add_tokens(&director.agent_id, 70, 30).await.unwrap();

    let tools = CoordinationTools::new(director.agent_id.clone(), true, db.stores.clone());
    let result = tools
        .call(
            "checkpoint",
            json!({
                "summary": { "goal": "coordinate the team" },
                "resumePointer": { "nextAction": "assign tasks", "phase": "spawning" }
            }),
        )
        .await
        .unwrap();
    assert_eq!(result["phase"], "spawning");

    let latest = db
        .stores
        .checkpoints
        .latest(&director.agent_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.tokens_used, 100);

    db.teardown().await;
}

#[tokio::test]
async fn test_observer_sees_every_execution() {
    let Some(db) = TestDb::connect().await else { return };

    let director = db.stores.agents.register(AgentRecord::director()).await.unwrap();

    let calls: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let calls_clone = Arc::clone(&calls);
    let observer: ToolObserver = Arc::new(move |name, _input, _result| {
        calls_clone.lock().unwrap().push(name.to_string());
    });

    let tools = CoordinationTools::new(director.agent_id.clone(), true, db.stores.clone())
        .with_observer(observer);

    tools.call("checkInbox", json!({})).await.unwrap();
    tools.call("listAgents", json!({})).await.unwrap();

    assert_eq!(*calls.lock().unwrap(), vec!["checkInbox", "listAgents"]);

    db.teardown().await;
}

#[tokio::test]
async fn test_list_agents_hides_terminal_statuses() {
    let Some(db) = TestDb::connect().await else { return };

    let director = db.stores.agents.register(AgentRecord::director()).await.unwrap();
    let done = db.stores.agents.register(AgentRecord::director()).await.unwrap();
    db.stores
        .agents
        .update_status(&done.agent_id, squad::domain::models::AgentStatus::Completed, None)
        .await
        .unwrap();

    let tools = CoordinationTools::new(director.agent_id.clone(), true, db.stores.clone());
    let listed = tools.call("listAgents", json!({})).await.unwrap();
    let ids: Vec<&str> = listed
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["agentId"].as_str().unwrap())
        .collect();

    assert!(ids.contains(&director.agent_id.as_str()));
    assert!(!ids.contains(&done.agent_id.as_str()));

    db.teardown().await;
}

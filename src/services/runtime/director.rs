//! Director orchestration loop.
//!
//! Decompose the root task into specialist subtasks, spawn and assign, wait
//! for terminal statuses (bounded), aggregate successful results into
//! markdown, summarize, and emit the final output between sentinels. Every
//! phase transition writes a checkpoint.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

use super::{RuntimeContext, DIRECTOR_OUTPUT_BEGIN, OUTPUT_END};
use crate::domain::models::{
    AgentRecord, AgentStatus, CheckpointSummary, MessageType, ResumePointer, Specialization, Task,
};

const DECOMPOSE_SYSTEM_PROMPT: &str = "You are a director agent coordinating a team of \
specialists. Decompose the user's task into 1-4 subtasks. Respond with JSON only, no prose, in \
exactly this shape: {\"subtasks\":[{\"title\":\"...\",\"description\":\"...\",\
\"specialization\":\"researcher|writer|analyst|general\"}]}";

const SUMMARIZE_SYSTEM_PROMPT: &str = "You are a director agent. Write a concise executive \
summary of the specialist results for the original task. Lead with the outcome.";

/// One planned unit of specialist work.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Subtask {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub specialization: Specialization,
}

#[derive(Deserialize)]
struct DecompositionPlan {
    subtasks: Vec<Subtask>,
}

/// Run the director loop to completion.
pub async fn run(ctx: &RuntimeContext) -> Result<()> {
    // Phase 1: decompose.
    let response = ctx
        .call_llm(&ctx.system_prompt(DECOMPOSE_SYSTEM_PROMPT), &ctx.task)
        .await
        .context("decomposition call failed")?;
    let subtasks = parse_subtasks(response.last_text().unwrap_or(""), &ctx.task);
    info!(count = subtasks.len(), "task decomposed");

    checkpoint(ctx, "spawning", &subtasks, &[], "spawn specialists and assign subtasks").await?;

    // Phase 2: spawn and assign. The change-stream watcher starts the actual
    // processes; the director only writes records.
    let mut spawned: Vec<(String, Subtask)> = Vec::new();
    for subtask in &subtasks {
        let specialist =
            AgentRecord::specialist(ctx.agent_id.clone(), subtask.specialization);
        let specialist = ctx.stores.agents.register(specialist).await?;

        let task = ctx
            .stores
            .tasks
            .create(&subtask.title, &subtask.description, None)
            .await?;
        ctx.stores
            .tasks
            .assign(&task.task_id, &specialist.agent_id)
            .await?;
        ctx.stores
            .messages
            .send(
                &ctx.agent_id,
                &specialist.agent_id,
                &format!("{}\n\n{}", subtask.title, subtask.description),
                MessageType::Task,
                None,
                None,
            )
            .await?;
        spawned.push((specialist.agent_id, subtask.clone()));
    }

    let spawned_ids: Vec<String> = spawned.iter().map(|(id, _)| id.clone()).collect();
    checkpoint(
        ctx,
        "waiting",
        &subtasks,
        &spawned_ids,
        "poll specialist task statuses until terminal",
    )
    .await?;

    // Phase 3: wait. Partial completion is acceptable on timeout.
    ctx.stores
        .agents
        .update_status(&ctx.agent_id, AgentStatus::Waiting, None)
        .await?;
    let tasks = wait_for_specialists(
        ctx,
        &spawned_ids,
        Duration::from_millis(ctx.config.director.wait_timeout_ms),
        Duration::from_millis(ctx.config.director.poll_interval_ms),
    )
    .await?;
    ctx.stores
        .agents
        .update_status(&ctx.agent_id, AgentStatus::Working, None)
        .await?;

    // Phase 4: aggregate successful results.
    let titles: HashMap<String, String> = spawned
        .iter()
        .map(|(id, subtask)| (id.clone(), subtask.title.clone()))
        .collect();
    let aggregated = aggregate_results(&tasks, &titles);

    // Phase 5: summarize.
    let summary_input = format!(
        "Original task:\n{}\n\nSpecialist results:\n{}",
        ctx.task, aggregated
    );
    let summary = match ctx
        .call_llm(&ctx.system_prompt(SUMMARIZE_SYSTEM_PROMPT), &summary_input)
        .await
    {
        Ok(response) => response.last_text().unwrap_or("").to_string(),
        Err(err) => {
            warn!(%err, "summary call failed; emitting aggregation only");
            String::new()
        }
    };

    // Phase 6: emit between sentinels.
    println!("{DIRECTOR_OUTPUT_BEGIN}");
    if summary.is_empty() {
        println!("{aggregated}");
    } else {
        println!("{summary}\n\n{aggregated}");
    }
    println!("{OUTPUT_END}");

    let completed: Vec<String> = tasks
        .iter()
        .filter(|t| t.status == crate::domain::models::TaskStatus::Completed)
        .map(|t| t.title.clone())
        .collect();
    ctx.stores
        .checkpoints
        .create(
            &ctx.agent_id,
            CheckpointSummary {
                goal: ctx.task.clone(),
                completed,
                pending: Vec::new(),
                decisions: vec![format!("decomposed into {} subtasks", subtasks.len())],
            },
            ResumePointer {
                next_action: "done".to_string(),
                phase: "complete".to_string(),
                current_context: None,
            },
            ctx.current_tokens().await,
        )
        .await?;

    Ok(())
}

/// Poll tasks assigned to `agent_ids` until all are terminal or the timeout
/// elapses; returns the last observed snapshot either way.
pub async fn wait_for_specialists(
    ctx: &RuntimeContext,
    agent_ids: &[String],
    timeout: Duration,
    poll_interval: Duration,
) -> Result<Vec<Task>> {
    let deadline = Instant::now() + timeout;
    loop {
        let tasks = ctx.stores.tasks.for_agents(agent_ids).await?;
        let terminal = tasks.iter().filter(|t| t.is_terminal()).count();
        if !tasks.is_empty() && terminal == tasks.len() {
            return Ok(tasks);
        }
        if Instant::now() >= deadline {
            warn!(
                terminal,
                total = tasks.len(),
                "specialist wait timed out; aggregating partial results"
            );
            return Ok(tasks);
        }
        sleep(poll_interval).await;
    }
}

/// Parse the first `{...}` JSON object out of the model's text. Any failure
/// falls back to a single general subtask wrapping the whole task.
pub fn parse_subtasks(text: &str, task: &str) -> Vec<Subtask> {
    let parsed = extract_json_object(text)
        .and_then(|json| serde_json::from_str::<DecompositionPlan>(json).ok())
        .map(|plan| plan.subtasks)
        .filter(|subtasks| !subtasks.is_empty());

    parsed.unwrap_or_else(|| {
        warn!("decomposition parse failed; falling back to a single subtask");
        vec![Subtask {
            title: "Complete task".to_string(),
            description: task.to_string(),
            specialization: Specialization::General,
        }]
    })
}

/// First balanced `{...}` substring, honoring JSON string escapes.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match byte {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Markdown document with one level-2 heading per completed subtask.
pub fn aggregate_results(tasks: &[Task], titles: &HashMap<String, String>) -> String {
    let mut out = String::new();
    for task in tasks {
        if task.status != crate::domain::models::TaskStatus::Completed {
            continue;
        }
        let Some(result) = &task.result else { continue };
        let title = task
            .assigned_to
            .as_ref()
            .and_then(|id| titles.get(id))
            .unwrap_or(&task.title);
        out.push_str(&format!("## {title}\n\n{result}\n\n"));
    }
    out.trim_end().to_string()
}

async fn checkpoint(
    ctx: &RuntimeContext,
    phase: &str,
    subtasks: &[Subtask],
    spawned_ids: &[String],
    next_action: &str,
) -> Result<()> {
    let current_context = if spawned_ids.is_empty() {
        None
    } else {
        Some(format!("specialists: {}", spawned_ids.join(", ")))
    };
    ctx.stores
        .checkpoints
        .create(
            &ctx.agent_id,
            CheckpointSummary {
                goal: ctx.task.clone(),
                completed: Vec::new(),
                pending: subtasks.iter().map(|s| s.title.clone()).collect(),
                decisions: Vec::new(),
            },
            ResumePointer {
                next_action: next_action.to_string(),
                phase: phase.to_string(),
                current_context,
            },
            ctx.current_tokens().await,
        )
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::TaskStatus;

    #[test]
    fn test_extract_json_object_plain() {
        let text = r#"{"subtasks":[]}"#;
        assert_eq!(extract_json_object(text), Some(text));
    }

    #[test]
    fn test_extract_json_object_with_prose() {
        let text = "Here is the plan:\n{\"subtasks\":[{\"title\":\"a\",\"description\":\"b\"}]} hope it helps";
        let json = extract_json_object(text).unwrap();
        assert!(json.starts_with('{'));
        assert!(json.ends_with('}'));
        assert!(serde_json::from_str::<serde_json::Value>(json).is_ok());
    }

    #[test]
    fn test_extract_json_object_braces_in_strings() {
        let text = r#"{"subtasks":[{"title":"use { and } carefully","description":"x"}]}"#;
        assert_eq!(extract_json_object(text), Some(text));
    }

    #[test]
    fn test_extract_json_object_unbalanced() {
        assert_eq!(extract_json_object("{\"open\": true"), None);
        assert_eq!(extract_json_object("no json here"), None);
    }

    #[test]
    fn test_parse_subtasks_valid_plan() {
        let text = r#"{"subtasks":[
            {"title":"Find docs","description":"search","specialization":"researcher"},
            {"title":"Summarize","description":"write","specialization":"writer"}
        ]}"#;
        let subtasks = parse_subtasks(text, "ignored");
        assert_eq!(subtasks.len(), 2);
        assert_eq!(subtasks[0].title, "Find docs");
        assert_eq!(subtasks[0].specialization, Specialization::Researcher);
        assert_eq!(subtasks[1].specialization, Specialization::Writer);
    }

    #[test]
    fn test_parse_subtasks_missing_specialization_defaults_general() {
        let text = r#"{"subtasks":[{"title":"t","description":"d"}]}"#;
        let subtasks = parse_subtasks(text, "ignored");
        assert_eq!(subtasks[0].specialization, Specialization::General);
    }

    #[test]
    fn test_parse_subtasks_fallback_on_prose() {
        let subtasks = parse_subtasks("I think we should split this up somehow.", "original task");
        assert_eq!(subtasks.len(), 1);
        assert_eq!(subtasks[0].title, "Complete task");
        assert_eq!(subtasks[0].description, "original task");
        assert_eq!(subtasks[0].specialization, Specialization::General);
    }

    #[test]
    fn test_parse_subtasks_fallback_on_empty_list() {
        let subtasks = parse_subtasks(r#"{"subtasks":[]}"#, "the task");
        assert_eq!(subtasks.len(), 1);
        assert_eq!(subtasks[0].description, "the task");
    }

    fn completed_task(agent_id: &str, title: &str, result: &str) -> Task {
        let mut task = Task::new(title, "desc", None);
        task.assigned_to = Some(agent_id.to_string());
        task.status = TaskStatus::Completed;
        task.result = Some(result.to_string());
        task
    }

    #[test]
    fn test_aggregate_results_headings_per_subtask() {
        let titles: HashMap<String, String> = [
            ("a1".to_string(), "Find docs".to_string()),
            ("a2".to_string(), "Summarize".to_string()),
        ]
        .into();
        let tasks = vec![
            completed_task("a1", "Find docs", "found them"),
            completed_task("a2", "Summarize", "summary text"),
        ];

        let doc = aggregate_results(&tasks, &titles);
        assert!(doc.contains("## Find docs"));
        assert!(doc.contains("## Summarize"));
        assert!(doc.contains("found them"));
        assert!(doc.contains("summary text"));
    }

    #[test]
    fn test_aggregate_skips_failed_and_unfinished() {
        let titles = HashMap::new();
        let mut failed = completed_task("a1", "Broken", "reason");
        failed.status = TaskStatus::Failed;
        let mut running = completed_task("a2", "Slow", "partial");
        running.status = TaskStatus::InProgress;
        let tasks = vec![
            failed,
            running,
            completed_task("a3", "Good", "result body"),
        ];

        let doc = aggregate_results(&tasks, &titles);
        assert!(!doc.contains("Broken"));
        assert!(!doc.contains("Slow"));
        assert!(doc.contains("## Good"));
    }
}

//! Specialist execution loop.
//!
//! One LLM call with the assigned task, sentinel-delimited output, one
//! checkpoint, and a result message back to the spawning director.

use anyhow::{Context, Result};
use tracing::info;

use super::{RuntimeContext, OUTPUT_END, SPECIALIST_OUTPUT_BEGIN};
use crate::domain::models::{CheckpointSummary, MessageType, ResumePointer, Specialization};

/// Role framing for each specialization.
fn system_prompt_for(specialization: Specialization) -> &'static str {
    match specialization {
        Specialization::Researcher => {
            "You are a research specialist. Investigate the task thoroughly and report findings \
             with sources where possible."
        }
        Specialization::Writer => {
            "You are a writing specialist. Produce clear, well-structured prose for the task."
        }
        Specialization::Analyst => {
            "You are an analysis specialist. Examine the task rigorously and report conclusions \
             with supporting reasoning."
        }
        Specialization::General => {
            "You are a capable generalist. Complete the task directly and report the result."
        }
    }
}

/// Run the specialist loop to completion.
pub async fn run(ctx: &RuntimeContext) -> Result<()> {
    let specialization = ctx.specialization.unwrap_or_default();
    let system = ctx.system_prompt(system_prompt_for(specialization));

    let response = ctx
        .call_llm(&system, &ctx.task)
        .await
        .context("specialist LLM call failed")?;
    let content = response.last_text().unwrap_or("").to_string();

    println!("{SPECIALIST_OUTPUT_BEGIN}");
    println!("{content}");
    println!("{OUTPUT_END}");

    ctx.stores
        .checkpoints
        .create(
            &ctx.agent_id,
            CheckpointSummary {
                goal: ctx.task.clone(),
                completed: vec!["task executed".to_string()],
                pending: Vec::new(),
                decisions: Vec::new(),
            },
            ResumePointer {
                next_action: "deliver result".to_string(),
                phase: "complete".to_string(),
                current_context: None,
            },
            ctx.current_tokens().await,
        )
        .await?;

    if let Some(parent_id) = &ctx.parent_id {
        ctx.stores
            .messages
            .send(
                &ctx.agent_id,
                parent_id,
                &content,
                MessageType::Result,
                None,
                None,
            )
            .await?;
        info!(parent_id = %parent_id, "result reported to director");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_varies_by_specialization() {
        let prompts: Vec<_> = [
            Specialization::Researcher,
            Specialization::Writer,
            Specialization::Analyst,
            Specialization::General,
        ]
        .iter()
        .map(|s| system_prompt_for(*s))
        .collect();

        for (i, a) in prompts.iter().enumerate() {
            for b in prompts.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }
}

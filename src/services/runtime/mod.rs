//! In-sandbox agent runtime.
//!
//! Both modes share the same scaffolding: connect to storage, resolve the
//! durable session, mark the agent `working`, run the mode-specific loop,
//! mark `completed` or `error`, disconnect, exit. Results travel on stdout
//! between sentinel lines; logs go to stderr.

pub mod director;
pub mod specialist;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info};

use crate::domain::models::{AgentStatus, AgentType, Config, Specialization};
use crate::domain::ports::LlmClient;
use crate::infrastructure::claude::types::{Message, MessageRequest, MessageResponse};
use crate::infrastructure::claude::ClaudeClientImpl;
use crate::infrastructure::mongo::{MongoConnection, Stores};

pub const DIRECTOR_OUTPUT_BEGIN: &str = "=== DIRECTOR OUTPUT ===";
pub const SPECIALIST_OUTPUT_BEGIN: &str = "=== SPECIALIST OUTPUT ===";
pub const OUTPUT_END: &str = "=== END OUTPUT ===";

/// Identity and task of one runtime invocation, parsed from the CLI and the
/// `AGENT_TASK` environment variable.
#[derive(Debug, Clone)]
pub struct AgentArgs {
    pub agent_id: String,
    pub agent_type: AgentType,
    pub specialization: Option<Specialization>,
    pub parent_id: Option<String>,
    pub task: String,
}

/// Everything a mode loop needs.
pub struct RuntimeContext {
    pub agent_id: String,
    pub parent_id: Option<String>,
    pub specialization: Option<Specialization>,
    pub task: String,
    pub session_id: String,
    pub resume_context: Option<String>,
    pub stores: Stores,
    pub llm: Arc<dyn LlmClient>,
    pub config: Config,
}

impl RuntimeContext {
    /// Base system prompt with the rendered resume context (if any) injected
    /// verbatim as a prefix.
    pub fn system_prompt(&self, base: &str) -> String {
        match &self.resume_context {
            Some(resume) => format!("{resume}\n{base}"),
            None => base.to_string(),
        }
    }

    /// One LLM exchange; usage is persisted before the response is used.
    pub async fn call_llm(&self, system: &str, user: &str) -> Result<MessageResponse> {
        let request = MessageRequest {
            model: self.config.claude.model.clone(),
            messages: vec![Message::user(user)],
            max_tokens: self.config.claude.max_tokens,
            system: Some(system.to_string()),
            temperature: None,
            tools: None,
        };
        let response = self
            .llm
            .send_message(request)
            .await
            .map_err(|e| anyhow::anyhow!("LLM request failed: {e}"))?;

        self.stores
            .agents
            .add_tokens(
                &self.agent_id,
                response.usage.input_tokens as u64,
                response.usage.output_tokens as u64,
            )
            .await
            .context("failed to record token usage")?;
        Ok(response)
    }

    /// Cumulative token count from the registry, for checkpoint stamps.
    pub async fn current_tokens(&self) -> u64 {
        self.stores
            .agents
            .get(&self.agent_id)
            .await
            .map(|a| a.token_usage.total())
            .unwrap_or(0)
    }
}

/// Runtime entry point: shared scaffolding around the mode loops.
pub async fn run(args: AgentArgs, config: Config) -> Result<()> {
    let conn = MongoConnection::connect(&config.mongodb.uri, &config.mongodb.db_name)
        .await
        .context("runtime failed to connect to storage")?;
    let stores = Stores::new(&conn);

    let agent = stores
        .agents
        .get(&args.agent_id)
        .await
        .context("agent record missing; the control plane creates it before launch")?;
    if agent.agent_type != args.agent_type {
        anyhow::bail!(
            "agent {} is a {}, launched as {}",
            args.agent_id,
            agent.agent_type.as_str(),
            args.agent_type.as_str()
        );
    }

    let session_id = stores.agents.get_or_create_session(&args.agent_id).await?;
    let resume_context = stores
        .checkpoints
        .build_resume_context(&args.agent_id)
        .await?;
    info!(
        agent_id = %args.agent_id,
        session_id = %session_id,
        resuming = resume_context.is_some(),
        "runtime starting"
    );

    // Current task id, if one is already assigned to us.
    let task_id = stores
        .tasks
        .for_agent(&args.agent_id)
        .await?
        .into_iter()
        .find(|t| !t.is_terminal())
        .map(|t| t.task_id);
    stores
        .agents
        .update_status(&args.agent_id, AgentStatus::Working, task_id.as_deref())
        .await?;

    let llm: Arc<dyn LlmClient> = Arc::new(
        ClaudeClientImpl::new(&config.claude)
            .map_err(|e| anyhow::anyhow!("failed to build LLM client: {e}"))?,
    );

    let ctx = RuntimeContext {
        agent_id: args.agent_id.clone(),
        parent_id: args.parent_id.clone(),
        specialization: args.specialization,
        task: args.task.clone(),
        session_id,
        resume_context,
        stores: stores.clone(),
        llm,
        config,
    };

    let outcome = match args.agent_type {
        AgentType::Director => director::run(&ctx).await,
        AgentType::Specialist => specialist::run(&ctx).await,
    };

    match outcome {
        Ok(()) => {
            stores
                .agents
                .update_status(&args.agent_id, AgentStatus::Completed, None)
                .await?;
            info!(agent_id = %args.agent_id, "runtime finished");
            conn.close().await;
            Ok(())
        }
        Err(err) => {
            error!(agent_id = %args.agent_id, %err, "runtime failed");
            if let Err(status_err) = stores
                .agents
                .update_status(&args.agent_id, AgentStatus::Error, None)
                .await
            {
                error!(%status_err, "failed to record error status");
            }
            conn.close().await;
            Err(err)
        }
    }
}

/// Extract the sentinel-delimited output for `agent_type` from a captured
/// stdout stream. Falls back to the whole trimmed stream when the sentinels
/// are absent.
pub fn extract_output(stdout: &str, agent_type: AgentType) -> String {
    let begin = match agent_type {
        AgentType::Director => DIRECTOR_OUTPUT_BEGIN,
        AgentType::Specialist => SPECIALIST_OUTPUT_BEGIN,
    };

    if let Some(start) = stdout.find(begin) {
        let after = &stdout[start + begin.len()..];
        if let Some(end) = after.find(OUTPUT_END) {
            return after[..end].trim().to_string();
        }
    }
    stdout.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_between_sentinels() {
        let stdout = format!(
            "log line\n{DIRECTOR_OUTPUT_BEGIN}\n## Findings\n\nbody\n{OUTPUT_END}\ntrailing"
        );
        assert_eq!(
            extract_output(&stdout, AgentType::Director),
            "## Findings\n\nbody"
        );
    }

    #[test]
    fn test_extract_wrong_sentinel_falls_back() {
        let stdout = format!("{SPECIALIST_OUTPUT_BEGIN}\nresult\n{OUTPUT_END}");
        // A director extractor does not match specialist sentinels.
        assert_eq!(extract_output(&stdout, AgentType::Director), stdout.trim());
        assert_eq!(extract_output(&stdout, AgentType::Specialist), "result");
    }

    #[test]
    fn test_extract_missing_end_falls_back() {
        let stdout = format!("{DIRECTOR_OUTPUT_BEGIN}\nno end marker");
        assert_eq!(extract_output(&stdout, AgentType::Director), stdout.trim());
    }

    #[test]
    fn test_extract_no_sentinels_uses_whole_stream() {
        assert_eq!(
            extract_output("  plain output  \n", AgentType::Specialist),
            "plain output"
        );
    }
}

//! Tool-driven agentic loop over the LLM.
//!
//! Each turn composes the conversation, sends it, and dispatches on the
//! response's stop_reason; tool calls are executed in order and their results
//! spliced back in as the next user message. Token usage accumulates every
//! turn and is persisted to the agent registry before the next request.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::error::RuntimeError;
use crate::domain::ports::{LlmClient, ToolHandler};
use crate::infrastructure::claude::types::{
    ContentBlock, Message, MessageContent, MessageRequest, StopReason,
};
use crate::infrastructure::mongo::AgentRegistry;

/// Why the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStop {
    /// Natural end of turn
    EndTurn,
    /// Model hit its output token ceiling; text may be partial
    MaxTokens,
    /// Turn cap reached without a natural end
    MaxTurns,
    /// Unrecognized stop reason; exited defensively
    Other,
}

impl LoopStop {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EndTurn => "end_turn",
            Self::MaxTokens => "max_tokens",
            Self::MaxTurns => "max_turns",
            Self::Other => "other",
        }
    }
}

/// Cumulative usage across all turns of one loop run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageTotals {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl UsageTotals {
    pub fn add(&mut self, input_tokens: u64, output_tokens: u64) {
        self.input_tokens += input_tokens;
        self.output_tokens += output_tokens;
    }

    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Final state of a finished loop.
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    pub text: String,
    pub stop: LoopStop,
    pub usage: UsageTotals,
    pub turns: u32,
}

/// Loop parameters.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub model: String,
    pub max_tokens: u32,
    pub max_turns: u32,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            model: "claude-3-5-sonnet-20241022".to_string(),
            max_tokens: 4096,
            max_turns: 50,
        }
    }
}

/// Multi-turn loop runner for one agent.
pub struct AgentLoop {
    llm: Arc<dyn LlmClient>,
    tools: Arc<dyn ToolHandler>,
    /// Persists per-turn usage; absent only in unit tests.
    registry: Option<AgentRegistry>,
    config: LoopConfig,
}

impl AgentLoop {
    pub fn new(llm: Arc<dyn LlmClient>, tools: Arc<dyn ToolHandler>, config: LoopConfig) -> Self {
        Self {
            llm,
            tools,
            registry: None,
            config,
        }
    }

    /// Enable durable token accounting for `agent_id`'s registry record.
    pub fn with_registry(mut self, registry: AgentRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Run the loop: `task` becomes the first user message, `system` the
    /// system prompt (with any resume context already spliced in by the
    /// caller).
    pub async fn run(
        &self,
        agent_id: &str,
        system: &str,
        task: &str,
    ) -> Result<LoopOutcome, RuntimeError> {
        let definitions = self.tools.definitions();
        let mut messages = vec![Message::user(task)];
        let mut usage = UsageTotals::default();
        let mut last_text = String::new();

        for turn in 0..self.config.max_turns {
            let request = MessageRequest {
                model: self.config.model.clone(),
                messages: messages.clone(),
                max_tokens: self.config.max_tokens,
                system: Some(system.to_string()),
                temperature: None,
                tools: Some(definitions.clone()),
            };

            let response = self
                .llm
                .send_message(request)
                .await
                .map_err(|e| RuntimeError::LlmFailure(e.to_string()))?;

            usage.add(
                response.usage.input_tokens as u64,
                response.usage.output_tokens as u64,
            );
            if let Some(registry) = &self.registry {
                registry
                    .add_tokens(
                        agent_id,
                        response.usage.input_tokens as u64,
                        response.usage.output_tokens as u64,
                    )
                    .await?;
            }

            if let Some(text) = response.last_text() {
                last_text = text.to_string();
            }

            match response.stop_reason {
                StopReason::EndTurn | StopReason::StopSequence => {
                    return Ok(LoopOutcome {
                        text: last_text,
                        stop: LoopStop::EndTurn,
                        usage,
                        turns: turn + 1,
                    });
                }
                StopReason::MaxTokens => {
                    warn!(agent_id, turn, "model hit max_tokens; returning partial text");
                    return Ok(LoopOutcome {
                        text: last_text,
                        stop: LoopStop::MaxTokens,
                        usage,
                        turns: turn + 1,
                    });
                }
                StopReason::ToolUse => {
                    let mut results = Vec::new();
                    for block in &response.content {
                        let ContentBlock::ToolUse { id, name, input } = block else {
                            continue;
                        };
                        debug!(agent_id, tool = %name, turn, "tool call");
                        let block = match self.tools.call(name, input.clone()).await {
                            Ok(value) => ContentBlock::ToolResult {
                                tool_use_id: id.clone(),
                                content: value.to_string(),
                                is_error: None,
                            },
                            Err(err) => ContentBlock::ToolResult {
                                tool_use_id: id.clone(),
                                content: err.to_string(),
                                is_error: Some(true),
                            },
                        };
                        results.push(block);
                    }

                    if results.is_empty() {
                        warn!(agent_id, turn, "tool_use stop without tool blocks; exiting");
                        return Ok(LoopOutcome {
                            text: last_text,
                            stop: LoopStop::Other,
                            usage,
                            turns: turn + 1,
                        });
                    }

                    messages.push(Message::assistant(MessageContent::Blocks(
                        response.content.clone(),
                    )));
                    messages.push(Message::user(MessageContent::Blocks(results)));
                }
                StopReason::Other => {
                    warn!(agent_id, turn, "unrecognized stop reason; exiting loop");
                    return Ok(LoopOutcome {
                        text: last_text,
                        stop: LoopStop::Other,
                        usage,
                        turns: turn + 1,
                    });
                }
            }
        }

        Ok(LoopOutcome {
            text: last_text,
            stop: LoopStop::MaxTurns,
            usage,
            turns: self.config.max_turns,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::claude::error::ClaudeApiError;
    use crate::infrastructure::claude::types::{MessageResponse, Tool, Usage};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    /// Scripted LLM returning canned responses in order.
    struct ScriptedLlm {
        responses: Mutex<Vec<MessageResponse>>,
        requests: Mutex<Vec<MessageRequest>>,
    }

    impl ScriptedLlm {
        fn new(responses: Vec<MessageResponse>) -> Self {
            Self {
                responses: Mutex::new(responses),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn send_message(
            &self,
            request: MessageRequest,
        ) -> Result<MessageResponse, ClaudeApiError> {
            self.requests.lock().unwrap().push(request);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(ClaudeApiError::Transport("script exhausted".to_string()));
            }
            Ok(responses.remove(0))
        }
    }

    struct EchoTools;

    #[async_trait]
    impl ToolHandler for EchoTools {
        fn definitions(&self) -> Vec<Tool> {
            vec![Tool {
                name: "echo".to_string(),
                description: "echo".to_string(),
                input_schema: json!({ "type": "object" }),
            }]
        }

        async fn call(&self, name: &str, input: Value) -> Result<Value, RuntimeError> {
            match name {
                "echo" => Ok(json!({ "echoed": input })),
                other => Err(RuntimeError::UnknownTool(other.to_string())),
            }
        }
    }

    fn text_response(text: &str, stop_reason: StopReason) -> MessageResponse {
        MessageResponse {
            id: "msg".to_string(),
            role: "assistant".to_string(),
            content: vec![ContentBlock::Text {
                text: text.to_string(),
            }],
            model: "test".to_string(),
            stop_reason,
            usage: Usage {
                input_tokens: 10,
                output_tokens: 5,
            },
        }
    }

    fn tool_response(name: &str, input: Value) -> MessageResponse {
        MessageResponse {
            id: "msg".to_string(),
            role: "assistant".to_string(),
            content: vec![ContentBlock::ToolUse {
                id: "tu_1".to_string(),
                name: name.to_string(),
                input,
            }],
            model: "test".to_string(),
            stop_reason: StopReason::ToolUse,
            usage: Usage {
                input_tokens: 20,
                output_tokens: 8,
            },
        }
    }

    fn loop_with(responses: Vec<MessageResponse>) -> (Arc<ScriptedLlm>, AgentLoop) {
        let llm = Arc::new(ScriptedLlm::new(responses));
        let agent_loop = AgentLoop::new(llm.clone(), Arc::new(EchoTools), LoopConfig::default());
        (llm, agent_loop)
    }

    #[tokio::test]
    async fn test_end_turn_returns_last_text() {
        let (_llm, agent_loop) = loop_with(vec![text_response("done", StopReason::EndTurn)]);
        let outcome = agent_loop.run("a1", "system", "task").await.unwrap();
        assert_eq!(outcome.stop, LoopStop::EndTurn);
        assert_eq!(outcome.text, "done");
        assert_eq!(outcome.turns, 1);
        assert_eq!(outcome.usage.input_tokens, 10);
        assert_eq!(outcome.usage.output_tokens, 5);
    }

    #[tokio::test]
    async fn test_tool_use_splices_results_and_continues() {
        let (llm, agent_loop) = loop_with(vec![
            tool_response("echo", json!({ "value": 7 })),
            text_response("finished", StopReason::EndTurn),
        ]);

        let outcome = agent_loop.run("a1", "system", "task").await.unwrap();
        assert_eq!(outcome.stop, LoopStop::EndTurn);
        assert_eq!(outcome.turns, 2);
        // Usage accumulated over both turns.
        assert_eq!(outcome.usage.input_tokens, 30);
        assert_eq!(outcome.usage.output_tokens, 13);

        // Second request carries the assistant turn and the tool results.
        let requests = llm.requests.lock().unwrap();
        let second = &requests[1];
        assert_eq!(second.messages.len(), 3);
        assert_eq!(second.messages[1].role, "assistant");
        assert_eq!(second.messages[2].role, "user");
        match &second.messages[2].content {
            MessageContent::Blocks(blocks) => match &blocks[0] {
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                } => {
                    assert_eq!(tool_use_id, "tu_1");
                    assert!(content.contains("echoed"));
                    assert!(is_error.is_none());
                }
                _ => panic!("expected tool_result"),
            },
            _ => panic!("expected blocks"),
        }
    }

    #[tokio::test]
    async fn test_tool_error_flagged_not_fatal() {
        let (llm, agent_loop) = loop_with(vec![
            tool_response("bogus", json!({})),
            text_response("recovered", StopReason::EndTurn),
        ]);

        let outcome = agent_loop.run("a1", "system", "task").await.unwrap();
        assert_eq!(outcome.text, "recovered");

        let requests = llm.requests.lock().unwrap();
        match &requests[1].messages[2].content {
            MessageContent::Blocks(blocks) => match &blocks[0] {
                ContentBlock::ToolResult { is_error, content, .. } => {
                    assert_eq!(*is_error, Some(true));
                    assert!(content.contains("unknown tool"));
                }
                _ => panic!("expected tool_result"),
            },
            _ => panic!("expected blocks"),
        }
    }

    #[tokio::test]
    async fn test_max_tokens_returns_partial() {
        let (_llm, agent_loop) = loop_with(vec![text_response("partial", StopReason::MaxTokens)]);
        let outcome = agent_loop.run("a1", "system", "task").await.unwrap();
        assert_eq!(outcome.stop, LoopStop::MaxTokens);
        assert_eq!(outcome.text, "partial");
    }

    #[tokio::test]
    async fn test_unknown_stop_reason_exits_defensively() {
        let (_llm, agent_loop) = loop_with(vec![text_response("odd", StopReason::Other)]);
        let outcome = agent_loop.run("a1", "system", "task").await.unwrap();
        assert_eq!(outcome.stop, LoopStop::Other);
    }

    #[tokio::test]
    async fn test_max_turns_cap() {
        let responses: Vec<_> = (0..3)
            .map(|_| tool_response("echo", json!({})))
            .collect();
        let llm = Arc::new(ScriptedLlm::new(responses));
        let agent_loop = AgentLoop::new(
            llm,
            Arc::new(EchoTools),
            LoopConfig {
                max_turns: 3,
                ..Default::default()
            },
        );

        let outcome = agent_loop.run("a1", "system", "task").await.unwrap();
        assert_eq!(outcome.stop, LoopStop::MaxTurns);
        assert_eq!(outcome.turns, 3);
    }

    #[tokio::test]
    async fn test_llm_failure_bubbles() {
        let (_llm, agent_loop) = loop_with(vec![]);
        let err = agent_loop.run("a1", "system", "task").await.unwrap_err();
        assert!(matches!(err, RuntimeError::LlmFailure(_)));
    }
}

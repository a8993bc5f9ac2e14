//! Tool dispatch port for the agentic loop.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::error::RuntimeError;
use crate::infrastructure::claude::types::Tool;

/// Executes one named tool call against the coordination plane.
///
/// The loop stringifies `Ok` results into `tool_result` blocks and flags
/// `Err` results as errors with the message as the block content.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Tool schema advertised to the LLM.
    fn definitions(&self) -> Vec<Tool>;

    /// Execute a tool by name with its JSON input.
    async fn call(&self, name: &str, input: Value) -> Result<Value, RuntimeError>;
}

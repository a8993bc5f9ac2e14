//! LLM client port.
//!
//! The provider is an opaque chat API: system/user/tool messages in, text
//! and tool_use blocks out. The wire types live with the Claude client in
//! `infrastructure::claude`.

use async_trait::async_trait;

use crate::infrastructure::claude::error::ClaudeApiError;
use crate::infrastructure::claude::types::{MessageRequest, MessageResponse};

/// Port over the chat completion API. Calls are never retried here; an
/// upstream failure surfaces to the caller as-is.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn send_message(&self, request: MessageRequest)
        -> Result<MessageResponse, ClaudeApiError>;
}

//! HTTP client for the Claude messages endpoint.

use async_trait::async_trait;
use reqwest::Client as ReqwestClient;
use std::time::Duration;

use super::error::ClaudeApiError;
use super::rate_limiter::TokenBucketRateLimiter;
use super::types::{MessageRequest, MessageResponse};
use crate::domain::models::ClaudeConfig;
use crate::domain::ports::LlmClient;

/// HTTP client for the Claude messages API.
///
/// Connection pooling via reqwest, client-side token-bucket rate limiting,
/// long request timeout for slow generations. Failed calls are not retried:
/// the coordination design treats an LLM failure as terminal for the run.
pub struct ClaudeClientImpl {
    http_client: ReqwestClient,
    api_key: String,
    base_url: String,
    model: String,
    rate_limiter: TokenBucketRateLimiter,
}

impl ClaudeClientImpl {
    pub fn new(config: &ClaudeConfig) -> Result<Self, ClaudeApiError> {
        let http_client = ReqwestClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(10)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| ClaudeApiError::Transport(e.to_string()))?;

        Ok(Self {
            http_client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            rate_limiter: TokenBucketRateLimiter::new(config.rate_limit_rps),
        })
    }

    /// Configured default model id.
    pub fn model(&self) -> &str {
        &self.model
    }

    async fn send_request(
        &self,
        request: &MessageRequest,
    ) -> Result<MessageResponse, ClaudeApiError> {
        let response = self
            .http_client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| ClaudeApiError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClaudeApiError::from_status(status, body));
        }

        response
            .json::<MessageResponse>()
            .await
            .map_err(|e| ClaudeApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl LlmClient for ClaudeClientImpl {
    async fn send_message(
        &self,
        request: MessageRequest,
    ) -> Result<MessageResponse, ClaudeApiError> {
        self.rate_limiter.acquire().await;
        self.send_request(&request).await
    }
}

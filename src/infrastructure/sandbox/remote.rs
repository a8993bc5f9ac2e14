//! Remote sandbox provider.
//!
//! HTTP client for an E2B-style sandbox service: long-lived VMs, file
//! upload, command execution with line-framed output streaming, and
//! pause/resume/kill. The service is opaque; this client only assumes the
//! endpoints below.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client as ReqwestClient;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::domain::error::SandboxError;
use crate::domain::models::{SandboxConfig, SandboxResources};
use crate::domain::ports::{
    CommandOutcome, CommandSpec, OutputHandler, OutputStream, SandboxProvider,
};

/// HTTP client for the remote sandbox service.
pub struct RemoteSandbox {
    http_client: ReqwestClient,
    api_key: String,
    base_url: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateResponse {
    sandbox_id: String,
}

/// One line of the exec response stream: output chunks followed by a final
/// exit frame.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExecFrame {
    #[serde(default)]
    stream: Option<String>,
    #[serde(default)]
    data: Option<String>,
    #[serde(default)]
    exit_code: Option<i32>,
    #[serde(default)]
    timed_out: bool,
}

impl RemoteSandbox {
    pub fn new(config: &SandboxConfig) -> Result<Self, SandboxError> {
        let http_client = ReqwestClient::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SandboxError::Provider(e.to_string()))?;

        Ok(Self {
            http_client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn post(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<reqwest::Response, SandboxError> {
        let response = self
            .http_client
            .post(self.url(path))
            .header("x-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| SandboxError::Provider(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(SandboxError::NotFound(path.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SandboxError::Provider(format!("{status}: {body}")));
        }
        Ok(response)
    }
}

#[async_trait]
impl SandboxProvider for RemoteSandbox {
    async fn create(&self, resources: &SandboxResources) -> Result<String, SandboxError> {
        let response = self
            .post("/sandboxes", json!({ "resources": resources }))
            .await
            .map_err(|e| SandboxError::CreationFailed(e.to_string()))?;

        let created: CreateResponse = response
            .json()
            .await
            .map_err(|e| SandboxError::CreationFailed(e.to_string()))?;
        debug!(sandbox_id = %created.sandbox_id, "remote sandbox created");
        Ok(created.sandbox_id)
    }

    async fn write_file(
        &self,
        sandbox_id: &str,
        path: &str,
        content: &str,
    ) -> Result<(), SandboxError> {
        self.post(
            &format!("/sandboxes/{sandbox_id}/files"),
            json!({ "path": path, "content": content }),
        )
        .await?;
        Ok(())
    }

    async fn exec(
        &self,
        sandbox_id: &str,
        spec: CommandSpec,
        output: Option<OutputHandler>,
    ) -> Result<CommandOutcome, SandboxError> {
        let body = json!({
            "command": spec.command,
            "cwd": spec.cwd,
            "env": spec.env,
            "timeoutMs": spec.timeout.map(|t| t.as_millis() as u64),
        });

        let response = self
            .post(&format!("/sandboxes/{sandbox_id}/exec"), body)
            .await?;

        let mut stdout = String::new();
        let mut stderr = String::new();
        let mut exit_code = -1;
        let mut timed_out = false;

        // The response body is a stream of newline-delimited JSON frames.
        let mut buffer = String::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| SandboxError::CommandFailed(e.to_string()))?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(newline) = buffer.find('\n') {
                let line: String = buffer.drain(..=newline).collect();
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let frame: ExecFrame = serde_json::from_str(line)
                    .map_err(|e| SandboxError::CommandFailed(format!("bad frame: {e}")))?;

                if let (Some(stream_name), Some(data)) = (&frame.stream, &frame.data) {
                    let stream_kind = if stream_name == "stderr" {
                        OutputStream::Stderr
                    } else {
                        OutputStream::Stdout
                    };
                    if let Some(handler) = &output {
                        handler(stream_kind, data);
                    }
                    match stream_kind {
                        OutputStream::Stdout => stdout.push_str(data),
                        OutputStream::Stderr => stderr.push_str(data),
                    }
                }
                if let Some(code) = frame.exit_code {
                    exit_code = code;
                    timed_out = frame.timed_out;
                }
            }
        }

        Ok(CommandOutcome {
            exit_code,
            stdout,
            stderr,
            timed_out,
        })
    }

    async fn signal_matching(&self, sandbox_id: &str, pattern: &str) -> Result<(), SandboxError> {
        // Best effort: have the sandbox kill by command-line pattern.
        self.post(
            &format!("/sandboxes/{sandbox_id}/kill-process"),
            json!({ "pattern": pattern }),
        )
        .await?;
        Ok(())
    }

    async fn pause(&self, sandbox_id: &str) -> Result<(), SandboxError> {
        self.post(&format!("/sandboxes/{sandbox_id}/pause"), json!({}))
            .await?;
        Ok(())
    }

    async fn resume(&self, sandbox_id: &str) -> Result<(), SandboxError> {
        self.post(&format!("/sandboxes/{sandbox_id}/resume"), json!({}))
            .await?;
        Ok(())
    }

    async fn destroy(&self, sandbox_id: &str) -> Result<(), SandboxError> {
        self.post(&format!("/sandboxes/{sandbox_id}/kill"), json!({}))
            .await?;
        Ok(())
    }
}

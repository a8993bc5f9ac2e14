//! Sandbox provider port.
//!
//! The remote sandbox service is opaque: it creates a long-lived VM, runs
//! commands with streamed stdout/stderr, and supports pause/resume/kill.
//! Implementations live in `infrastructure::sandbox`.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::error::SandboxError;
use crate::domain::models::SandboxResources;

/// Which stream an output chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

/// Chunk-wise output callback. Invoked from the command's read loop, so it
/// must not block.
pub type OutputHandler = Arc<dyn Fn(OutputStream, &str) + Send + Sync>;

/// One command to run inside a sandbox.
///
/// `command` carries only operator-authored text plus UUID-shaped ids and
/// enum values; user task text travels exclusively through `env`.
#[derive(Debug, Clone, Default)]
pub struct CommandSpec {
    pub command: String,
    pub cwd: Option<String>,
    pub env: HashMap<String, String>,
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Result of a finished (or timed-out) command.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl CommandOutcome {
    pub fn is_error(&self) -> bool {
        self.exit_code != 0 || self.timed_out
    }
}

/// Port over the sandbox service.
#[async_trait]
pub trait SandboxProvider: Send + Sync {
    /// Create a sandbox and return its provider-assigned id.
    async fn create(&self, resources: &SandboxResources) -> Result<String, SandboxError>;

    /// Write a file into the sandbox filesystem, creating parent directories.
    async fn write_file(
        &self,
        sandbox_id: &str,
        path: &str,
        content: &str,
    ) -> Result<(), SandboxError>;

    /// Run a command to completion, streaming chunks to `output` as they
    /// arrive. Timeouts are reported via `CommandOutcome::timed_out`, not an
    /// `Err`, so partial output survives.
    async fn exec(
        &self,
        sandbox_id: &str,
        spec: CommandSpec,
        output: Option<OutputHandler>,
    ) -> Result<CommandOutcome, SandboxError>;

    /// Best-effort kill of processes whose command line contains `pattern`.
    /// The sandbox itself stays alive.
    async fn signal_matching(&self, sandbox_id: &str, pattern: &str) -> Result<(), SandboxError>;

    /// Suspend every process in the sandbox.
    async fn pause(&self, sandbox_id: &str) -> Result<(), SandboxError>;

    /// Resume a paused sandbox.
    async fn resume(&self, sandbox_id: &str) -> Result<(), SandboxError>;

    /// Tear the sandbox down and release its resources.
    async fn destroy(&self, sandbox_id: &str) -> Result<(), SandboxError>;
}

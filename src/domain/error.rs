//! Domain error types.
//!
//! Each enum covers one infrastructure or coordination concern. Local
//! recovery happens only where the design calls for it (decomposition parse
//! fallback, director wait timeout, watcher double-start guard); everything
//! else propagates to the caller.

use thiserror::Error;

use super::models::TaskStatus;

/// Errors from the MongoDB-backed stores.
#[derive(Error, Debug)]
pub enum StoreError {
    /// No document with the given identifier
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Schema-level violation detected before or by the database
    #[error("validation failed: {0}")]
    Validation(String),

    /// Unique-index violation (e.g. re-registering an agentId)
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    /// Forbidden task status transition
    #[error("invalid status transition from {from:?} to {to:?}")]
    TransitionViolation { from: TaskStatus, to: TaskStatus },

    /// Connection or query failure against MongoDB
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// Document could not be (de)serialized
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Transient errors may succeed on retry; the rest are permanent.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl From<mongodb::error::Error> for StoreError {
    fn from(err: mongodb::error::Error) -> Self {
        use mongodb::error::{ErrorKind, WriteFailure};

        match err.kind.as_ref() {
            ErrorKind::Write(WriteFailure::WriteError(write_err)) if write_err.code == 11000 => {
                Self::DuplicateKey(write_err.message.clone())
            }
            ErrorKind::BsonSerialization(e) => Self::Serialization(e.to_string()),
            ErrorKind::BsonDeserialization(e) => Self::Serialization(e.to_string()),
            _ => Self::Unavailable(err.to_string()),
        }
    }
}

/// Errors from the sandbox orchestrator and providers.
#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("sandbox creation failed: {0}")]
    CreationFailed(String),

    #[error("sandbox not found: {0}")]
    NotFound(String),

    #[error("command execution failed: {0}")]
    CommandFailed(String),

    /// Distinct from execution failure so callers can classify it
    #[error("command timed out after {timeout_ms}ms")]
    CommandTimeout { timeout_ms: u64 },

    /// Double-start guard: the agent already has a running process
    #[error("agent already running: {0}")]
    AgentAlreadyRunning(String),

    #[error("agent not registered with the sandbox: {0}")]
    AgentNotRegistered(String),

    /// Provider-level failure (HTTP, process spawn, signal delivery)
    #[error("sandbox provider error: {0}")]
    Provider(String),
}

impl SandboxError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::CommandTimeout { .. })
    }
}

/// Errors from the agent runtime and the agentic loop.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Upstream LLM failure. Never retried here.
    #[error("LLM request failed: {0}")]
    LlmFailure(String),

    #[error("tool {name} failed: {message}")]
    ToolFailed { name: String, message: String },

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("tool {0} is restricted to directors")]
    DirectorOnly(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid tool input: {0}")]
    InvalidInput(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        let err = StoreError::not_found("task", "abc");
        assert_eq!(err.to_string(), "task not found: abc");

        let err = StoreError::TransitionViolation {
            from: TaskStatus::Completed,
            to: TaskStatus::Pending,
        };
        assert!(err.to_string().contains("Completed"));
    }

    #[test]
    fn test_store_error_transience() {
        assert!(StoreError::Unavailable("down".to_string()).is_transient());
        assert!(!StoreError::not_found("agent", "x").is_transient());
        assert!(!StoreError::DuplicateKey("agentId".to_string()).is_transient());
    }

    #[test]
    fn test_sandbox_timeout_classified() {
        let err = SandboxError::CommandTimeout { timeout_ms: 5000 };
        assert!(err.is_timeout());
        assert!(!SandboxError::CommandFailed("exit 1".to_string()).is_timeout());
    }

    #[test]
    fn test_runtime_error_wraps_store() {
        let err: RuntimeError = StoreError::not_found("message", "m1").into();
        assert!(matches!(err, RuntimeError::Store(_)));
    }
}

//! REST error mapping.
//!
//! Every failure leaves the API as `{error, message, statusCode}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::domain::error::{SandboxError, StoreError};

/// An error ready to serialize as a REST body.
#[derive(Debug)]
pub struct ApiError {
    pub code: &'static str,
    pub message: String,
    pub status: StatusCode,
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            code: "not_found",
            message: message.into(),
            status: StatusCode::NOT_FOUND,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            code: "validation_error",
            message: message.into(),
            status: StatusCode::BAD_REQUEST,
        }
    }

    pub fn conflict(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            status: StatusCode::CONFLICT,
        }
    }

    pub fn internal(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            status: StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": self.code,
            "message": self.message,
            "statusCode": self.status.as_u16(),
        });
        (self.status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match &err {
            StoreError::NotFound { .. } => Self::not_found(err.to_string()),
            StoreError::Validation(_) => Self::validation(err.to_string()),
            StoreError::DuplicateKey(_) => Self::conflict("duplicate_key", err.to_string()),
            StoreError::TransitionViolation { .. } => {
                Self::conflict("transition_violation", err.to_string())
            }
            StoreError::Unavailable(_) => Self::internal("storage_unavailable", err.to_string()),
            StoreError::Serialization(_) => Self::internal("serialization_error", err.to_string()),
        }
    }
}

impl From<SandboxError> for ApiError {
    fn from(err: SandboxError) -> Self {
        match &err {
            SandboxError::NotFound(_) | SandboxError::AgentNotRegistered(_) => {
                Self::not_found(err.to_string())
            }
            SandboxError::AgentAlreadyRunning(_) => {
                Self::conflict("agent_already_running", err.to_string())
            }
            SandboxError::CommandTimeout { .. } => Self {
                code: "command_timeout",
                message: err.to_string(),
                status: StatusCode::GATEWAY_TIMEOUT,
            },
            SandboxError::CreationFailed(_) => {
                Self::internal("sandbox_creation_failed", err.to_string())
            }
            SandboxError::CommandFailed(_) | SandboxError::Provider(_) => {
                Self::internal("sandbox_error", err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::TaskStatus;

    #[test]
    fn test_store_error_status_mapping() {
        let err: ApiError = StoreError::not_found("task", "t1").into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);

        let err: ApiError = StoreError::Validation("bad".to_string()).into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let err: ApiError = StoreError::TransitionViolation {
            from: TaskStatus::Completed,
            to: TaskStatus::Pending,
        }
        .into();
        assert_eq!(err.status, StatusCode::CONFLICT);

        let err: ApiError = StoreError::Unavailable("down".to_string()).into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_sandbox_error_status_mapping() {
        let err: ApiError = SandboxError::AgentAlreadyRunning("a1".to_string()).into();
        assert_eq!(err.status, StatusCode::CONFLICT);

        let err: ApiError = SandboxError::CommandTimeout { timeout_ms: 10 }.into();
        assert_eq!(err.status, StatusCode::GATEWAY_TIMEOUT);
    }
}

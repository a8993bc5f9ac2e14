//! Failure classification for Claude messages calls.
//!
//! The coordination runtime never retries an LLM call, so a failed call has
//! exactly one consumer: the run that made it, which aborts and surfaces the
//! message. Classification exists for logs and for embedders that wrap this
//! client in their own retry policy.

use reqwest::StatusCode;
use thiserror::Error;

/// Longest provider-body excerpt carried inside an error message.
const DETAIL_CHARS: usize = 200;

/// Error from one Claude messages call.
#[derive(Error, Debug, Clone)]
pub enum ClaudeApiError {
    /// The provider answered with a non-success status. `detail` is a
    /// truncated excerpt of the response body.
    #[error("claude api returned {status}: {detail}")]
    Api { status: u16, detail: String },

    /// The request never completed: connect failure, TLS, timeout.
    #[error("claude request failed: {0}")]
    Transport(String),

    /// A success status whose body this client could not decode.
    #[error("claude response undecodable: {0}")]
    Decode(String),
}

impl ClaudeApiError {
    /// Build the `Api` variant from a status code and raw body.
    pub fn from_status(status: StatusCode, body: String) -> Self {
        Self::Api {
            status: status.as_u16(),
            detail: detail_of(&body),
        }
    }

    /// Whether a retrying embedder could reasonably try again: overload
    /// (429), server-side errors, and transport failures qualify. A decode
    /// failure or a 4xx will not get better on its own.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::Transport(_) => true,
            Self::Decode(_) => false,
        }
    }

    /// Whether the credential itself was rejected. Worth distinguishing
    /// because every agent process inherits the same `ANTHROPIC_API_KEY`:
    /// one auth failure means the whole session is misconfigured.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Api { status: 401 | 403, .. })
    }
}

/// First [`DETAIL_CHARS`] characters of a provider body, on one line.
fn detail_of(body: &str) -> String {
    let flat = body.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut chars = flat.char_indices();
    match chars.nth(DETAIL_CHARS) {
        Some((boundary, _)) => format!("{}...", &flat[..boundary]),
        None => flat,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_variant_carries_status() {
        let err = ClaudeApiError::from_status(
            StatusCode::BAD_REQUEST,
            "{\"error\":\"bad field\"}".to_string(),
        );
        match &err {
            ClaudeApiError::Api { status, detail } => {
                assert_eq!(*status, 400);
                assert!(detail.contains("bad field"));
            }
            _ => panic!("expected Api variant"),
        }
        assert!(!err.is_transient());
        assert!(!err.is_auth());
    }

    #[test]
    fn test_transience_by_status() {
        assert!(ClaudeApiError::from_status(StatusCode::TOO_MANY_REQUESTS, String::new())
            .is_transient());
        assert!(
            ClaudeApiError::from_status(StatusCode::from_u16(529).unwrap(), String::new())
                .is_transient()
        );
        assert!(!ClaudeApiError::from_status(StatusCode::NOT_FOUND, String::new()).is_transient());
        assert!(ClaudeApiError::Transport("connection reset".to_string()).is_transient());
        assert!(!ClaudeApiError::Decode("eof".to_string()).is_transient());
    }

    #[test]
    fn test_auth_rejection_detected() {
        assert!(ClaudeApiError::from_status(StatusCode::UNAUTHORIZED, String::new()).is_auth());
        assert!(ClaudeApiError::from_status(StatusCode::FORBIDDEN, String::new()).is_auth());
        assert!(!ClaudeApiError::from_status(StatusCode::BAD_REQUEST, String::new()).is_auth());
    }

    #[test]
    fn test_detail_flattened_and_truncated() {
        let body = format!("line one\nline two {}", "z".repeat(400));
        let err = ClaudeApiError::from_status(StatusCode::INTERNAL_SERVER_ERROR, body);
        match err {
            ClaudeApiError::Api { detail, .. } => {
                assert!(detail.starts_with("line one line two"));
                assert!(detail.ends_with("..."));
                assert_eq!(detail.chars().count(), DETAIL_CHARS + 3);
            }
            _ => panic!("expected Api variant"),
        }
    }

    #[test]
    fn test_display_messages() {
        let err = ClaudeApiError::from_status(StatusCode::TOO_MANY_REQUESTS, "slow down".into());
        assert_eq!(err.to_string(), "claude api returned 429: slow down");

        let err = ClaudeApiError::Transport("dns".to_string());
        assert_eq!(err.to_string(), "claude request failed: dns");
    }
}

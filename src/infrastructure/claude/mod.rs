//! Claude API client: wire types, errors, rate limiting, HTTP client.

pub mod client;
pub mod error;
pub mod rate_limiter;
pub mod types;

pub use client::ClaudeClientImpl;
pub use error::ClaudeApiError;

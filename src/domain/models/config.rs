//! Runtime configuration model.
//!
//! Loaded by the figment-based loader in `infrastructure::config`; the
//! spec-mandated environment variables (`MONGODB_URI`, `ANTHROPIC_API_KEY`,
//! …) are overlaid after extraction.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub mongodb: MongoConfig,
    pub claude: ClaudeConfig,
    pub sandbox: SandboxConfig,
    pub director: DirectorConfig,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            mongodb: MongoConfig::default(),
            claude: ClaudeConfig::default(),
            sandbox: SandboxConfig::default(),
            director: DirectorConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MongoConfig {
    pub uri: String,
    pub db_name: String,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            uri: "mongodb://127.0.0.1:27017".to_string(),
            db_name: "squad-lite".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaudeConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    /// Sustained request rate enforced by the client-side token bucket
    pub rate_limit_rps: f64,
    pub timeout_secs: u64,
}

impl Default for ClaudeConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.anthropic.com".to_string(),
            model: "claude-3-5-sonnet-20241022".to_string(),
            max_tokens: 4096,
            rate_limit_rps: 10.0,
            timeout_secs: 300,
        }
    }
}

/// Which sandbox provider backs the shared sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxProviderKind {
    /// OS processes on this machine, for tests and single-host deployments
    Local,
    /// Remote sandbox service (E2B-style HTTP API)
    Remote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub provider: SandboxProviderKind,
    /// Remote provider credential (`E2B_API_KEY`)
    pub api_key: String,
    pub base_url: String,
    /// Scratch root for the local provider
    pub workspace_dir: String,
    pub cpu_count: u32,
    pub memory_mb: u32,
    pub timeout_ms: u64,
    /// Flat rate used to estimate sandbox cost on kill
    pub cost_per_second: f64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            provider: SandboxProviderKind::Local,
            api_key: String::new(),
            base_url: "https://api.e2b.dev".to_string(),
            workspace_dir: std::env::temp_dir()
                .join("squad-sandboxes")
                .to_string_lossy()
                .into_owned(),
            cpu_count: 2,
            memory_mb: 1024,
            timeout_ms: 30 * 60 * 1000,
            cost_per_second: 0.000_014,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectorConfig {
    /// How long the director waits for specialists before aggregating
    pub wait_timeout_ms: u64,
    /// Poll interval while waiting on specialist task statuses
    pub poll_interval_ms: u64,
    /// Turn cap of the host-side agentic loop
    pub max_turns: u32,
}

impl Default for DirectorConfig {
    fn default() -> Self {
        Self {
            wait_timeout_ms: 120_000,
            poll_interval_ms: 2_000,
            max_turns: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

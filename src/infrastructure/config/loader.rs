use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::Config;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid port: 0")]
    InvalidPort,

    #[error("MongoDB URI cannot be empty")]
    EmptyMongoUri,

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid rate limit: {0}. Must be positive")]
    InvalidRateLimit(f64),

    #[error("Invalid director poll interval: 0")]
    InvalidPollInterval,

    #[error("Invalid max_turns: 0")]
    InvalidMaxTurns,
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults
    /// 2. squad.yaml in the working directory (optional)
    /// 3. SQUAD_* environment variables
    /// 4. The standard unprefixed variables (`MONGODB_URI`, `MONGODB_DB_NAME`,
    ///    `ANTHROPIC_API_KEY`, `E2B_API_KEY`, `HOST`, `PORT`)
    pub fn load() -> Result<Config> {
        let mut config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file("squad.yaml"))
            .merge(Env::prefixed("SQUAD_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::apply_standard_env(&mut config);
        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file (plus the standard env vars).
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let mut config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::apply_standard_env(&mut config);
        Self::validate(&config)?;
        Ok(config)
    }

    /// The standard variables override everything else. Secrets only ever
    /// enter through here or the prefixed env, never the database.
    fn apply_standard_env(config: &mut Config) {
        if let Ok(uri) = std::env::var("MONGODB_URI") {
            config.mongodb.uri = uri;
        }
        if let Ok(name) = std::env::var("MONGODB_DB_NAME") {
            config.mongodb.db_name = name;
        }
        if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
            config.claude.api_key = key;
        }
        if let Ok(key) = std::env::var("E2B_API_KEY") {
            config.sandbox.api_key = key;
        }
        if let Ok(host) = std::env::var("HOST") {
            config.host = host;
        }
        if let Ok(port) = std::env::var("PORT") {
            if let Ok(port) = port.parse() {
                config.port = port;
            }
        }
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.port == 0 {
            return Err(ConfigError::InvalidPort);
        }

        if config.mongodb.uri.is_empty() {
            return Err(ConfigError::EmptyMongoUri);
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        if config.claude.rate_limit_rps <= 0.0 {
            return Err(ConfigError::InvalidRateLimit(config.claude.rate_limit_rps));
        }

        if config.director.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidPollInterval);
        }

        if config.director.max_turns == 0 {
            return Err(ConfigError::InvalidMaxTurns);
        }

        Ok(())
    }
}

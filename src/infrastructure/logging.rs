//! Logger initialization using tracing.

use anyhow::{anyhow, Result};
use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::domain::models::LoggingConfig;

/// Initialize the global tracing subscriber.
///
/// The agent runtime passes `to_stderr = true`: its stdout carries the
/// sentinel-delimited result stream and must stay free of log lines.
pub fn init(config: &LoggingConfig, to_stderr: bool) -> Result<()> {
    let level = parse_log_level(&config.level)?;
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match (config.format.as_str(), to_stderr) {
        ("json", true) => builder.json().with_writer(std::io::stderr).init(),
        ("json", false) => builder.json().init(),
        (_, true) => builder.with_writer(std::io::stderr).init(),
        (_, false) => builder.init(),
    }

    Ok(())
}

fn parse_log_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        other => Err(anyhow!("invalid log level: {other}")),
    }
}

//! Squad entry point.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::info;

use squad::api::{router, AppState};
use squad::cli::{Cli, Commands};
use squad::infrastructure::config::ConfigLoader;
use squad::infrastructure::logging;
use squad::infrastructure::mongo::{MongoConnection, Stores};
use squad::infrastructure::sandbox::provider_from_config;
use squad::services::event_bus::EventBus;
use squad::services::runtime;
use squad::services::sandbox_orchestrator::SandboxOrchestrator;
use squad::services::watchers::Watchers;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = ConfigLoader::load().context("Failed to load configuration")?;

    match cli.command {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            logging::init(&config.logging, false)?;
            serve(config).await
        }
        Commands::Agent(agent_args) => {
            // Stdout belongs to the sentinel-delimited result stream.
            logging::init(&config.logging, true)?;
            let args = agent_args.into_agent_args()?;
            runtime::run(args, config).await
        }
    }
}

/// Control-plane server: storage, watchers, sandbox orchestrator, HTTP.
async fn serve(config: squad::domain::models::Config) -> Result<()> {
    let conn = MongoConnection::connect(&config.mongodb.uri, &config.mongodb.db_name)
        .await
        .context("Failed to connect to MongoDB")?;
    conn.ensure_indexes()
        .await
        .context("Failed to create indexes")?;
    let stores = Stores::new(&conn);

    let events = Arc::new(EventBus::default());
    let provider =
        provider_from_config(&config.sandbox).context("Failed to build sandbox provider")?;
    let orchestrator = Arc::new(SandboxOrchestrator::new(
        provider,
        stores.clone(),
        Arc::clone(&events),
        config.clone(),
    ));

    let watchers = Watchers::new(
        conn.clone(),
        stores.clone(),
        Arc::clone(&orchestrator),
        Arc::clone(&events),
    );
    let watcher_handles = Arc::clone(&watchers).spawn();

    let state = AppState {
        config: config.clone(),
        stores,
        orchestrator,
        events,
    };
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, "control plane listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    for handle in watcher_handles {
        handle.abort();
    }
    conn.close().await;
    info!("control plane stopped");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}

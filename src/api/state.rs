//! Shared application state for the HTTP layer.

use std::sync::Arc;

use crate::domain::models::Config;
use crate::infrastructure::mongo::Stores;
use crate::services::event_bus::EventBus;
use crate::services::sandbox_orchestrator::SandboxOrchestrator;

/// Cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub stores: Stores,
    pub orchestrator: Arc<SandboxOrchestrator>,
    pub events: Arc<EventBus>,
}

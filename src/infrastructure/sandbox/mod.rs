//! Sandbox provider implementations.

pub mod local;
pub mod remote;

pub use local::LocalProcessSandbox;
pub use remote::RemoteSandbox;

use std::sync::Arc;

use crate::domain::error::SandboxError;
use crate::domain::models::{SandboxConfig, SandboxProviderKind};
use crate::domain::ports::SandboxProvider;

/// Build the provider selected by configuration.
pub fn provider_from_config(
    config: &SandboxConfig,
) -> Result<Arc<dyn SandboxProvider>, SandboxError> {
    match config.provider {
        SandboxProviderKind::Local => Ok(Arc::new(LocalProcessSandbox::new(
            config.workspace_dir.clone(),
        ))),
        SandboxProviderKind::Remote => Ok(Arc::new(RemoteSandbox::new(config)?)),
    }
}

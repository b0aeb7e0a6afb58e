//! Shared gateway state

use std::sync::Arc;

use pw_core::config::GatewayConfig;

use crate::backend::{BackendSpawner, LocalSpawner};
use crate::plugins::PluginRegistry;
use crate::registry::ProcessRegistry;

/// State handed to every connection task
pub struct GatewayState {
    /// Configuration
    pub config: GatewayConfig,
    /// Published backends
    pub registry: Arc<ProcessRegistry>,
    /// Starts backends for new connections
    pub spawner: Arc<dyn BackendSpawner>,
}

impl GatewayState {
    /// Create state that spawns in-process backends from `plugins`
    pub fn new(config: GatewayConfig, plugins: PluginRegistry) -> Self {
        let spawner = Arc::new(LocalSpawner::new(Arc::new(plugins), config.clone()));
        Self::with_spawner(config, spawner)
    }

    /// Create state with a custom spawner
    pub fn with_spawner(config: GatewayConfig, spawner: Arc<dyn BackendSpawner>) -> Self {
        Self {
            config,
            registry: Arc::new(ProcessRegistry::new()),
            spawner,
        }
    }

    /// Get the process registry
    pub fn registry(&self) -> &Arc<ProcessRegistry> {
        &self.registry
    }
}

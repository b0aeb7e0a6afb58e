//! Starting backends for new connections

use std::sync::Arc;

use async_trait::async_trait;

use pw_core::config::GatewayConfig;
use pw_core::error::RouteError;
use pw_protocol::ConnectionId;

use super::handle::ProcessHandle;
use super::host::spawn_backend;
use crate::plugins::PluginRegistry;

/// Creates the backend for a newly requested connection
#[async_trait]
pub trait BackendSpawner: Send + Sync {
    /// Start a backend speaking `protocol` for `connection_id`
    async fn spawn(
        &self,
        protocol: &str,
        connection_id: ConnectionId,
    ) -> Result<ProcessHandle, RouteError>;
}

/// Spawns backends as tasks in this process using the registered plugins
pub struct LocalSpawner {
    plugins: Arc<PluginRegistry>,
    config: GatewayConfig,
}

impl LocalSpawner {
    pub fn new(plugins: Arc<PluginRegistry>, config: GatewayConfig) -> Self {
        Self { plugins, config }
    }
}

#[async_trait]
impl BackendSpawner for LocalSpawner {
    async fn spawn(
        &self,
        protocol: &str,
        connection_id: ConnectionId,
    ) -> Result<ProcessHandle, RouteError> {
        let plugin = self.plugins.get(protocol).ok_or_else(|| {
            RouteError::BackendSpawn(format!("no plugin for protocol \"{}\"", protocol))
        })?;

        let handler = plugin
            .create_handler(&connection_id)
            .map_err(|e| RouteError::BackendSpawn(e.to_string()))?;

        tracing::debug!(
            "Spawning {} backend for connection \"{}\"",
            plugin.name(),
            connection_id
        );
        Ok(spawn_backend(connection_id, handler, &self.config))
    }
}

//! Protocol plugins
//!
//! A plugin supplies the session handlers for one protocol name. Users
//! creating a connection name the protocol in their `select` instruction
//! and the spawner looks it up here.

mod mirror;

pub use mirror::MirrorPlugin;

use std::collections::HashMap;
use std::sync::Arc;

use pw_core::error::SessionError;
use pw_core::ClientHandler;
use pw_protocol::ConnectionId;

/// Source of session handlers for one protocol
pub trait ProtocolPlugin: Send + Sync {
    /// Protocol name users select
    fn name(&self) -> &str;

    /// Build the handlers for a new connection
    fn create_handler(
        &self,
        connection_id: &ConnectionId,
    ) -> Result<Arc<dyn ClientHandler>, SessionError>;
}

/// Registered plugins by protocol name
#[derive(Default)]
pub struct PluginRegistry {
    plugins: HashMap<String, Arc<dyn ProtocolPlugin>>,
}

impl PluginRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the plugins shipped with the gateway
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(MirrorPlugin));
        registry
    }

    /// Register a plugin, replacing any with the same name
    pub fn register(&mut self, plugin: Arc<dyn ProtocolPlugin>) -> Option<Arc<dyn ProtocolPlugin>> {
        let name = plugin.name().to_string();
        let previous = self.plugins.insert(name.clone(), plugin);
        if previous.is_some() {
            tracing::warn!("Replaced protocol plugin \"{}\"", name);
        }
        previous
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ProtocolPlugin>> {
        self.plugins.get(name).cloned()
    }

    /// Registered protocol names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.plugins.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

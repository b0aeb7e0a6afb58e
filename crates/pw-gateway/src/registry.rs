//! Process registry
//!
//! Maps connection ids to the backends hosting them so later users can
//! join. A backend is only published once its first user is attached and
//! is withdrawn when it exits.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

use pw_core::error::RegistryError;
use pw_protocol::ConnectionId;

use crate::backend::ProcessHandle;

/// Live backends indexed by connection id
pub struct ProcessRegistry {
    processes: DashMap<ConnectionId, Arc<ProcessHandle>>,
}

impl ProcessRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            processes: DashMap::new(),
        }
    }

    /// Publish a backend. Fails if the id is already taken.
    pub fn add(
        &self,
        id: ConnectionId,
        handle: Arc<ProcessHandle>,
    ) -> Result<(), RegistryError> {
        match self.processes.entry(id) {
            Entry::Occupied(entry) => Err(RegistryError::Conflict(entry.key().to_string())),
            Entry::Vacant(entry) => {
                entry.insert(handle);
                Ok(())
            }
        }
    }

    /// Look up a backend by id
    pub fn retrieve(&self, id: &ConnectionId) -> Option<Arc<ProcessHandle>> {
        self.processes.get(id).map(|r| Arc::clone(&r))
    }

    /// Withdraw a backend
    pub fn remove(&self, id: &ConnectionId) -> Option<Arc<ProcessHandle>> {
        self.processes.remove(id).map(|(_, handle)| handle)
    }

    /// Withdraw a backend only if the entry still refers to `handle`
    pub fn remove_if_same(&self, id: &ConnectionId, handle: &Arc<ProcessHandle>) -> bool {
        self.processes
            .remove_if(id, |_, current| Arc::ptr_eq(current, handle))
            .is_some()
    }

    /// Ids of every published backend
    pub fn list(&self) -> Vec<ConnectionId> {
        self.processes.iter().map(|r| r.key().clone()).collect()
    }

    /// Number of published backends
    pub fn len(&self) -> usize {
        self.processes.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    /// Terminate every backend and wait for each to exit
    pub async fn shutdown(&self) {
        let handles: Vec<Arc<ProcessHandle>> =
            self.processes.iter().map(|r| Arc::clone(r.value())).collect();
        self.processes.clear();

        if !handles.is_empty() {
            tracing::info!("Terminating {} backends", handles.len());
        }
        for handle in &handles {
            handle.terminate();
        }
        for handle in handles {
            handle.wait().await;
        }
    }
}

impl Default for ProcessRegistry {
    fn default() -> Self {
        Self::new()
    }
}

//! Plugin registry - running instances by user-assigned id
//!
//! The supervisor registers every instance that carries a non-empty `ID`
//! so other plugins and the control surface can find it. Registration is
//! append-mostly and guarded by a lock; handles are cheap `Arc` clones.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::control::PluginState;
use crate::error::{CoreError, Result};
use crate::producer::ControlSender;

/// What the registry knows about a running instance
///
/// Implementations wrap the shared state cell and control sender of a
/// plugin whose value has been moved into its worker task.
pub trait RegisteredPlugin: Send + Sync {
    /// User-assigned instance id
    fn id(&self) -> &str;

    /// Dotted plugin type
    fn type_name(&self) -> &str;

    /// Current lifecycle state, when the instance exposes one
    fn state(&self) -> Option<PluginState> {
        None
    }

    /// Control channel sender, when the instance accepts control messages
    fn control(&self) -> Option<ControlSender> {
        None
    }
}

/// Id → instance table
#[derive(Default)]
pub struct PluginRegistry {
    plugins: RwLock<HashMap<String, Arc<dyn RegisteredPlugin>>>,
}

impl PluginRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an instance under its id
    ///
    /// An empty id means "do not register" and is a no-op. Re-registering
    /// an id replaces the previous binding.
    pub fn register(&self, plugin: Arc<dyn RegisteredPlugin>) {
        let id = plugin.id().to_string();
        if id.is_empty() {
            return;
        }
        let mut plugins = self.plugins.write().expect("plugin table poisoned");
        plugins.insert(id, plugin);
    }

    /// Register an instance, rejecting duplicate ids
    ///
    /// On conflict the original binding is kept and an error is returned.
    pub fn register_unique(&self, plugin: Arc<dyn RegisteredPlugin>) -> Result<()> {
        let id = plugin.id().to_string();
        if id.is_empty() {
            return Ok(());
        }
        let mut plugins = self.plugins.write().expect("plugin table poisoned");
        if plugins.contains_key(&id) {
            return Err(CoreError::DuplicateId(id));
        }
        plugins.insert(id, plugin);
        Ok(())
    }

    /// Look up an instance by id
    pub fn get(&self, id: &str) -> Option<Arc<dyn RegisteredPlugin>> {
        let plugins = self.plugins.read().expect("plugin table poisoned");
        plugins.get(id).cloned()
    }

    /// Look up an instance that exposes a live state
    ///
    /// Returns `None` when the id is unknown, the instance has no queryable
    /// state, or the instance is already dead.
    pub fn get_with_state(&self, id: &str) -> Option<Arc<dyn RegisteredPlugin>> {
        self.get(id)
            .filter(|p| matches!(p.state(), Some(state) if state != PluginState::Dead))
    }

    /// Registered instance count
    pub fn len(&self) -> usize {
        self.plugins.read().expect("plugin table poisoned").len()
    }

    /// True when nothing is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All registered ids, sorted
    pub fn ids(&self) -> Vec<String> {
        let plugins = self.plugins.read().expect("plugin table poisoned");
        let mut ids: Vec<String> = plugins.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Drop every registration
    ///
    /// Intended for tests that reuse a shared registry.
    pub fn clear(&self) {
        self.plugins.write().expect("plugin table poisoned").clear();
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.len())
            .finish()
    }
}

#[cfg(test)]
#[path = "plugin_registry_test.rs"]
mod plugin_registry_test;

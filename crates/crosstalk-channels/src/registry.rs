//! Plugin registry.
//!
//! An explicitly constructed, explicitly owned catalog of active plugins,
//! created at application start and torn down at shutdown. Never a
//! process-wide singleton.

use std::collections::HashMap;
use std::sync::Arc;

use crate::traits::{ChannelPlugin, PluginState};

/// Registry of configured channel plugins.
pub struct PluginRegistry {
    plugins: HashMap<String, Arc<dyn ChannelPlugin>>,
}

impl PluginRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            plugins: HashMap::new(),
        }
    }

    /// Register a plugin under its channel id.
    pub fn register(&mut self, plugin: Arc<dyn ChannelPlugin>) {
        self.plugins.insert(plugin.id().to_string(), plugin);
    }

    /// Get a plugin by channel id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Arc<dyn ChannelPlugin>> {
        self.plugins.get(id)
    }

    /// List all registered channel ids.
    #[must_use]
    pub fn list(&self) -> Vec<&str> {
        self.plugins.keys().map(String::as_str).collect()
    }

    /// Lifecycle state of every registered plugin.
    #[must_use]
    pub fn states(&self) -> HashMap<String, PluginState> {
        self.plugins
            .iter()
            .map(|(id, plugin)| (id.clone(), plugin.state()))
            .collect()
    }

    /// Stop every started plugin. Stop is idempotent, so stopped plugins
    /// are safe to include.
    pub async fn stop_all(&self) {
        for (id, plugin) in &self.plugins {
            if let Err(err) = plugin.stop().await {
                tracing::warn!(channel = %id, error = %err, "plugin stop failed");
            }
        }
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ABOUTME: Name-keyed table of task client constructors.
// ABOUTME: relay picks one at startup from the [backend] type in its config.

use crate::config::BackendConfig;
use crate::TaskClient;
use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Builds a task client from its backend-specific settings
pub type BackendFactory = Box<dyn Fn(&Value) -> Result<Arc<dyn TaskClient>> + Send + Sync>;

/// Backends available to this process, ordered by name
pub struct BackendRegistry {
    factories: BTreeMap<String, BackendFactory>,
}

impl BackendRegistry {
    /// A registry with nothing registered
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Add or replace the factory for `name`
    pub fn register<F>(mut self, name: &str, factory: F) -> Self
    where
        F: Fn(&Value) -> Result<Arc<dyn TaskClient>> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Box::new(factory));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered backend names, sorted
    pub fn available(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    pub fn create(&self, name: &str, settings: &Value) -> Result<Arc<dyn TaskClient>> {
        let factory = self.factories.get(name).ok_or_else(|| {
            anyhow!(
                "Unknown backend: {} (available: {})",
                name,
                self.available().join(", ")
            )
        })?;
        factory(settings).with_context(|| format!("Invalid settings for backend '{}'", name))
    }

    pub fn create_from_config(&self, config: &BackendConfig) -> Result<Arc<dyn TaskClient>> {
        self.create(config.backend_type(), &config.to_json_value()?)
    }
}

impl Default for BackendRegistry {
    /// The built-in backends: the Claude CLI and the scripted mock
    fn default() -> Self {
        use crate::backends::direct_cli::DirectCliBackend;
        use crate::backends::mock::MockBackend;

        Self::new()
            .register("direct", DirectCliBackend::factory())
            .register("mock", MockBackend::factory())
    }
}

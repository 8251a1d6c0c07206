// ABOUTME: Backend selection config, embedded as the [backend] table of relay's config.
// ABOUTME: The type discriminator picks a factory; remaining keys go to that factory.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Backend configuration with type discriminator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Backend type: "direct" or "mock"
    #[serde(rename = "type")]
    pub backend_type: String,

    /// Remaining fields passed to backend factory
    #[serde(flatten)]
    pub config: toml::Table,
}

impl BackendConfig {
    /// Config for the direct CLI backend using the given binary
    pub fn direct(binary: &str) -> Self {
        let mut config = toml::Table::new();
        config.insert("binary".to_string(), toml::Value::String(binary.to_string()));
        Self {
            backend_type: "direct".to_string(),
            config,
        }
    }

    /// Get backend type name
    pub fn backend_type(&self) -> &str {
        &self.backend_type
    }

    /// Set or replace a backend-specific key
    pub fn set(&mut self, key: &str, value: impl Into<toml::Value>) {
        self.config.insert(key.to_string(), value.into());
    }

    /// Convert config table to serde_json::Value for the registry
    pub fn to_json_value(&self) -> Result<serde_json::Value> {
        serde_json::to_value(&self.config).context("Failed to convert backend config to JSON")
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::direct("claude")
    }
}

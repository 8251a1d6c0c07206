// ABOUTME: Configuration parsing from TOML file with environment variable overrides
// ABOUTME: Sections: [backend], [orchestrator], [workspace]; validated before use

use crate::paths;
use anyhow::{Context, Result};
use relay_agent::{BackendConfig, BackendRegistry, TaskClient};
use relay_core::OrchestratorConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "RELAY_CONFIG_PATH";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Root under which every channel gets its own directory
    #[serde(default = "default_workspace_path")]
    pub path: String,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            path: default_workspace_path(),
        }
    }
}

fn default_workspace_path() -> String {
    "./workspace".to_string()
}

impl Config {
    /// Load configuration with environment variable overrides.
    ///
    /// Uses `explicit` when given, else the first of `$RELAY_CONFIG_PATH`,
    /// `./config.toml` and the XDG config file that exists. With no file at
    /// all, defaults are used.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("Config file not found: {}", path.display());
                }
                Some(path.to_path_buf())
            }
            None => Self::find_config_file(),
        };

        let mut config = match &path {
            Some(path) => Self::from_file(path)?,
            None => {
                tracing::debug!("No config file found - using defaults");
                Config::default()
            }
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn find_config_file() -> Option<PathBuf> {
        if let Ok(val) = std::env::var(CONFIG_PATH_ENV) {
            return Some(PathBuf::from(val));
        }
        [PathBuf::from("config.toml"), paths::config_file()]
            .into_iter()
            .find(|candidate| candidate.exists())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid config TOML")
    }

    /// Apply RELAY_* and CLAUDE_BINARY_PATH overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var("RELAY_WORKSPACE_PATH") {
            self.workspace.path = val;
        }
        if let Ok(val) = std::env::var("CLAUDE_BINARY_PATH") {
            self.backend.set("binary", val);
        }
        if let Ok(val) = std::env::var("RELAY_MODEL") {
            self.orchestrator.model = Some(val).filter(|m| !m.trim().is_empty());
        }
        if let Ok(val) = std::env::var("RELAY_FALLBACK_MODEL") {
            self.orchestrator.fallback_model = val;
        }
        if let Ok(val) = std::env::var("RELAY_STARTUP_TIMEOUT_SECS") {
            self.orchestrator.startup_timeout_secs = val.parse().with_context(|| {
                format!("RELAY_STARTUP_TIMEOUT_SECS must be a whole number of seconds, got: {}", val)
            })?;
        }
        if let Ok(val) = std::env::var("RELAY_ACTIVITY_TIMEOUT_SECS") {
            self.orchestrator.activity_timeout_secs = val.parse().with_context(|| {
                format!("RELAY_ACTIVITY_TIMEOUT_SECS must be a whole number of seconds, got: {}", val)
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.workspace.path.trim().is_empty() {
            anyhow::bail!("workspace.path is required (set in config.toml or RELAY_WORKSPACE_PATH env var)");
        }
        if self.backend.backend_type().trim().is_empty() {
            anyhow::bail!("backend.type must not be empty");
        }
        self.orchestrator.validate()
    }

    pub fn workspace_path(&self) -> PathBuf {
        PathBuf::from(&self.workspace.path)
    }

    /// Build the task client named by [backend]
    pub fn create_client(&self) -> Result<Arc<dyn TaskClient>> {
        BackendRegistry::default().create_from_config(&self.backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.backend.backend_type(), "direct");
        assert_eq!(config.workspace.path, "./workspace");
        assert_eq!(config.orchestrator, OrchestratorConfig::default());
        config.validate().unwrap();
    }

    #[test]
    fn test_sections_parse() {
        let config = Config::from_toml_str(
            r#"
[backend]
type = "mock"

[orchestrator]
startup_timeout_secs = 10
model = "opus"
retry_exit_codes = [1, 3]

[workspace]
path = "/srv/relay"
"#,
        )
        .unwrap();

        assert_eq!(config.backend.backend_type(), "mock");
        assert_eq!(config.orchestrator.startup_timeout_secs, 10);
        assert_eq!(config.orchestrator.activity_timeout_secs, 300);
        assert_eq!(config.orchestrator.model.as_deref(), Some("opus"));
        assert_eq!(config.orchestrator.retry_exit_codes, vec![1, 3]);
        assert_eq!(config.workspace_path(), PathBuf::from("/srv/relay"));
    }

    #[test]
    fn test_validate_rejects_blank_workspace() {
        let mut config = Config::default();
        config.workspace.path = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_create_client_unknown_backend() {
        let config = Config::from_toml_str("[backend]\ntype = \"carrier-pigeon\"").unwrap();
        let err = config.create_client().err().unwrap();
        assert!(format!("{:#}", err).contains("carrier-pigeon"));
    }

    #[test]
    fn test_create_client_mock() {
        let config = Config::from_toml_str("[backend]\ntype = \"mock\"").unwrap();
        assert_eq!(config.create_client().unwrap().name(), "mock");
    }
}

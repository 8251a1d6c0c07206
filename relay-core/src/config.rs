// ABOUTME: Orchestrator tuning: liveness deadlines, model selection, retry policy and batching.
// ABOUTME: Deserialized from the [orchestrator] table of relay's config file.

use crate::monitor::MonitorConfig;
use crate::retry::RetryPolicy;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Seconds allowed before a task's first event
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,
    /// Longest silence tolerated once a task is streaming
    #[serde(default = "default_activity_timeout_secs")]
    pub activity_timeout_secs: u64,
    /// Model passed on every run unless a submission overrides it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Model used for the single retry after a CLI crash
    #[serde(default = "default_fallback_model")]
    pub fallback_model: String,
    /// Exit codes that trigger the fallback retry
    #[serde(default = "default_retry_exit_codes")]
    pub retry_exit_codes: Vec<i32>,
    /// Maximum events per delivered batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Longest a partial batch waits before delivery
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
}

/// Upper bound for either liveness timeout (one week)
pub const MAX_TIMEOUT_SECS: u64 = 7 * 24 * 60 * 60;

/// Upper bound for the batch flush interval (one minute)
pub const MAX_FLUSH_INTERVAL_MS: u64 = 60_000;

fn default_startup_timeout_secs() -> u64 {
    30
}

fn default_activity_timeout_secs() -> u64 {
    300
}

fn default_fallback_model() -> String {
    "sonnet".to_string()
}

fn default_retry_exit_codes() -> Vec<i32> {
    vec![1]
}

fn default_batch_size() -> usize {
    16
}

fn default_flush_interval_ms() -> u64 {
    750
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            startup_timeout_secs: default_startup_timeout_secs(),
            activity_timeout_secs: default_activity_timeout_secs(),
            model: None,
            fallback_model: default_fallback_model(),
            retry_exit_codes: default_retry_exit_codes(),
            batch_size: default_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
        }
    }
}

impl OrchestratorConfig {
    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            startup_timeout: Duration::from_secs(self.startup_timeout_secs),
            activity_timeout: Duration::from_secs(self.activity_timeout_secs),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.fallback_model.clone(), self.retry_exit_codes.clone())
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.startup_timeout_secs == 0 {
            anyhow::bail!("orchestrator.startup_timeout_secs must be greater than zero");
        }
        if self.activity_timeout_secs == 0 {
            anyhow::bail!("orchestrator.activity_timeout_secs must be greater than zero");
        }
        if self.startup_timeout_secs > MAX_TIMEOUT_SECS
            || self.activity_timeout_secs > MAX_TIMEOUT_SECS
        {
            anyhow::bail!(
                "orchestrator timeouts must be at most {} seconds",
                MAX_TIMEOUT_SECS
            );
        }
        if self.fallback_model.trim().is_empty() {
            anyhow::bail!("orchestrator.fallback_model must not be empty");
        }
        if self.batch_size == 0 {
            anyhow::bail!("orchestrator.batch_size must be greater than zero");
        }
        if self.flush_interval_ms == 0 || self.flush_interval_ms > MAX_FLUSH_INTERVAL_MS {
            anyhow::bail!(
                "orchestrator.flush_interval_ms must be between 1 and {}",
                MAX_FLUSH_INTERVAL_MS
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = OrchestratorConfig::default();
        config.validate().unwrap();
        assert_eq!(config.monitor_config(), MonitorConfig::default());
        assert_eq!(config.retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn test_partial_table_uses_defaults() {
        let config: OrchestratorConfig = from_json(r#"{"activity_timeout_secs": 60}"#);
        assert_eq!(config.activity_timeout_secs, 60);
        assert_eq!(config.startup_timeout_secs, 30);
        assert_eq!(config.retry_exit_codes, vec![1]);
    }

    #[test]
    fn test_validate_rejects_zero_timeouts() {
        let config = OrchestratorConfig {
            startup_timeout_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = OrchestratorConfig {
            fallback_model: "  ".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_caps_timeouts_and_flush_interval() {
        let config = OrchestratorConfig {
            activity_timeout_secs: u64::MAX,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = OrchestratorConfig {
            startup_timeout_secs: MAX_TIMEOUT_SECS,
            activity_timeout_secs: MAX_TIMEOUT_SECS,
            ..Default::default()
        };
        config.validate().unwrap();

        let config = OrchestratorConfig {
            flush_interval_ms: MAX_FLUSH_INTERVAL_MS + 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    fn from_json(json: &str) -> OrchestratorConfig {
        serde_json::from_str(json).unwrap()
    }
}

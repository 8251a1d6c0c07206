// ABOUTME: Fallback policy for CLI-level crashes: one retry on a different model, no resume.
// ABOUTME: Classification is by explicit exit code, never by matching error text.

use crate::error::{FailureKind, TaskFailure};
use relay_agent::TaskOptions;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Model used for the single retry
    pub fallback_model: String,
    /// Exit codes that mark a failure as retryable
    pub retry_exit_codes: Vec<i32>,
}

impl RetryPolicy {
    pub fn new(fallback_model: impl Into<String>, retry_exit_codes: Vec<i32>) -> Self {
        Self {
            fallback_model: fallback_model.into(),
            retry_exit_codes,
        }
    }

    /// Only abnormal exits with a listed code qualify; timeouts and aborts are terminal
    pub fn should_retry(&self, failure: &TaskFailure) -> bool {
        match failure.kind {
            FailureKind::AbnormalExit(code) => self.retry_exit_codes.contains(&code),
            FailureKind::StartupTimeout
            | FailureKind::ActivityTimeout
            | FailureKind::Aborted
            | FailureKind::Other => false,
        }
    }

    /// Options for the retry: fallback model, and the prior session is presumed corrupt
    pub fn fallback_options(&self) -> TaskOptions {
        TaskOptions {
            resume_session_id: None,
            continue_conversation: false,
            model: Some(self.fallback_model.clone()),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new("sonnet", vec![1])
    }
}

// ABOUTME: Terminal failure taxonomy for one dispatched task.
// ABOUTME: Every monitor and client error is converted into a TaskFailure at the executor boundary.

use relay_agent::TaskError;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// What kind of failure ended a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No event arrived before the startup deadline
    StartupTimeout,
    /// The stream went silent past the activity deadline
    ActivityTimeout,
    /// Cancelled by the user or the system
    Aborted,
    /// The external process exited with this code
    AbnormalExit(i32),
    /// Anything else, surfaced verbatim
    Other,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StartupTimeout => write!(f, "startup_timeout"),
            Self::ActivityTimeout => write!(f, "activity_timeout"),
            Self::Aborted => write!(f, "aborted"),
            Self::AbnormalExit(code) => write!(f, "abnormal_exit({})", code),
            Self::Other => write!(f, "other"),
        }
    }
}

/// A task's terminal failure with the diagnostic output captured along the way
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{message}")]
pub struct TaskFailure {
    pub kind: FailureKind,
    pub message: String,
    /// Captured stderr excerpt (may be empty)
    pub diagnostics: String,
}

impl TaskFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>, diagnostics: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            diagnostics: diagnostics.into(),
        }
    }

    pub fn startup_timeout(after: Duration, diagnostics: impl Into<String>) -> Self {
        Self::new(
            FailureKind::StartupTimeout,
            format!("No output from the assistant within {}s", after.as_secs()),
            diagnostics,
        )
    }

    pub fn activity_timeout(after: Duration, diagnostics: impl Into<String>) -> Self {
        Self::new(
            FailureKind::ActivityTimeout,
            format!("Assistant went silent for {}s", after.as_secs()),
            diagnostics,
        )
    }

    pub fn aborted(diagnostics: impl Into<String>) -> Self {
        Self::new(FailureKind::Aborted, "Task was cancelled", diagnostics)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Other, message, String::new())
    }

    /// Convert a stream-level error, attaching the diagnostics captured so far
    pub fn from_task_error(error: TaskError, diagnostics: impl Into<String>) -> Self {
        let kind = match &error {
            TaskError::Aborted => FailureKind::Aborted,
            TaskError::AbnormalExit { code } => FailureKind::AbnormalExit(*code),
            TaskError::Other(_) => FailureKind::Other,
        };
        Self::new(kind, error.to_string(), diagnostics)
    }

    /// Fold an earlier attempt's diagnostics in front of this failure's
    pub fn with_prior_attempt(mut self, prior: &TaskFailure, retry_model: &str) -> Self {
        let first = if prior.diagnostics.is_empty() {
            prior.message.clone()
        } else {
            format!("{}\n{}", prior.message, prior.diagnostics)
        };
        self.diagnostics = format!(
            "[attempt 1]\n{}\n[attempt 2, model {}]\n{}",
            first, retry_model, self.diagnostics
        );
        self
    }

    pub fn is_aborted(&self) -> bool {
        self.kind == FailureKind::Aborted
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self.kind,
            FailureKind::StartupTimeout | FailureKind::ActivityTimeout
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_task_error_maps_kinds() {
        let failure = TaskFailure::from_task_error(TaskError::AbnormalExit { code: 1 }, "stderr");
        assert_eq!(failure.kind, FailureKind::AbnormalExit(1));
        assert_eq!(failure.message, "process exited with code 1");
        assert_eq!(failure.diagnostics, "stderr");

        let failure = TaskFailure::from_task_error(TaskError::Aborted, "");
        assert!(failure.is_aborted());
    }

    #[test]
    fn test_with_prior_attempt_keeps_both_excerpts() {
        let first = TaskFailure::new(FailureKind::AbnormalExit(1), "exit 1", "first stderr");
        let second = TaskFailure::new(FailureKind::AbnormalExit(2), "exit 2", "second stderr")
            .with_prior_attempt(&first, "sonnet");

        assert_eq!(second.kind, FailureKind::AbnormalExit(2));
        assert_eq!(second.message, "exit 2");
        assert!(second.diagnostics.contains("first stderr"));
        assert!(second.diagnostics.contains("second stderr"));
        assert!(second.diagnostics.contains("model sonnet"));
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(FailureKind::AbnormalExit(3).to_string(), "abnormal_exit(3)");
        assert_eq!(FailureKind::StartupTimeout.to_string(), "startup_timeout");
    }
}

// ABOUTME: Typed failures a streaming task can end with.
// ABOUTME: Streams yield these instead of silently ending when the process fails.

use thiserror::Error;

/// Why a streaming task stopped before finishing normally
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskError {
    /// The task observed its cancellation token and stopped
    #[error("task was aborted")]
    Aborted,

    /// The external process exited with a non-zero status
    #[error("process exited with code {code}")]
    AbnormalExit { code: i32 },

    /// Anything else (spawn failures, signals, broken pipes)
    #[error("{0}")]
    Other(String),
}

impl TaskError {
    pub fn other(message: impl Into<String>) -> Self {
        TaskError::Other(message.into())
    }
}

impl From<std::io::Error> for TaskError {
    fn from(err: std::io::Error) -> Self {
        TaskError::Other(err.to_string())
    }
}

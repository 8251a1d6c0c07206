// ABOUTME: Core TaskClient trait that all backends implement.
// ABOUTME: Defines the request shape and the streaming run handed back to callers.

use crate::handle::TaskRun;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// Per-invocation options that influence how the external task resumes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskOptions {
    /// Resume this prior session instead of starting fresh
    pub resume_session_id: Option<String>,
    /// Continue the most recent conversation in the working directory
    pub continue_conversation: bool,
    /// Model override for this run
    pub model: Option<String>,
}

/// Everything a backend needs to start one streaming task
#[derive(Debug, Clone)]
pub struct TaskRequest {
    pub working_dir: PathBuf,
    pub prompt: String,
    /// Signalled when the caller wants the task to stop
    pub cancel: CancellationToken,
    pub options: TaskOptions,
}

/// Core trait that all task backends implement.
///
/// `start` never fails directly: spawn errors are reported as the first item
/// of the returned stream so callers have exactly one place to handle them.
pub trait TaskClient: Send + Sync {
    /// Backend name for logging and metrics
    fn name(&self) -> &'static str;

    /// Start a task and return its event stream plus captured diagnostics
    fn start(&self, request: TaskRequest) -> TaskRun;
}

// ABOUTME: Delivery sink trait implemented by chat transports to render task output.
// ABOUTME: Also defines the terminal outcome every dispatched task reports exactly once.

use crate::error::TaskFailure;
use anyhow::Result;
use async_trait::async_trait;
use relay_agent::AgentEvent;

/// Summary of a task that finished normally
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionSummary {
    /// Total cost in USD, if the backend reported one
    pub cost_usd: Option<f64>,
    /// Backend-reported duration, falling back to measured wall time
    pub duration_ms: Option<u64>,
    /// Session id announced during the run
    pub session_id: Option<String>,
    /// Set when the run only succeeded on the fallback model
    pub fallback_model: Option<String>,
    /// Number of events delivered
    pub events: usize,
}

impl CompletionSummary {
    /// Fold one event into the summary
    pub fn observe(&mut self, event: &AgentEvent) {
        self.events += 1;
        match event {
            AgentEvent::SessionStarted { session_id } => {
                self.session_id = Some(session_id.clone());
            }
            AgentEvent::Result {
                cost_usd,
                duration_ms,
                ..
            } => {
                self.cost_usd = cost_usd.or(self.cost_usd);
                self.duration_ms = duration_ms.or(self.duration_ms);
            }
            AgentEvent::Text(_)
            | AgentEvent::Thinking(_)
            | AgentEvent::ToolStart { .. }
            | AgentEvent::ToolResult { .. } => {}
        }
    }
}

/// Terminal result of one dispatched task
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Completed(CompletionSummary),
    Failed(TaskFailure),
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Completed(_))
    }

    pub fn failure(&self) -> Option<&TaskFailure> {
        match self {
            TaskOutcome::Failed(failure) => Some(failure),
            TaskOutcome::Completed(_) => None,
        }
    }
}

/// Receives a task's output for rendering.
///
/// Errors are logged by the executor and never abort the task.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    /// Deliver an ordered batch of events
    async fn deliver(&self, channel_key: &str, batch: &[AgentEvent]) -> Result<()>;

    /// Deliver the terminal outcome of a task
    async fn notify(&self, channel_key: &str, outcome: &TaskOutcome) -> Result<()>;
}

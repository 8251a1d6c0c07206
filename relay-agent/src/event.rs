// ABOUTME: Event types emitted by a streaming task during prompt execution.
// ABOUTME: Closed set of variants; backends convert their raw output into these.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Events emitted by a task client while a prompt runs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum AgentEvent {
    /// Streaming assistant text chunk
    Text(String),

    /// Assistant reasoning output
    Thinking(String),

    /// Tool invocation started
    ToolStart {
        /// Unique identifier for this tool invocation
        id: String,
        /// Tool name (e.g., "Read", "Bash", "Edit")
        name: String,
        /// Full input passed to the tool
        input: Value,
    },

    /// Tool produced its result
    ToolResult {
        /// Matches the id from ToolStart
        id: String,
        /// Output returned to the assistant
        output: Value,
        /// Whether the tool reported success
        success: bool,
    },

    /// The external process announced the session it is running in
    SessionStarted {
        /// Resumption token for later prompts
        session_id: String,
    },

    /// Final summary of the run
    Result {
        /// Final text reported by the backend (may be empty)
        text: String,
        /// Total cost in USD, if reported
        cost_usd: Option<f64>,
        /// Wall-clock duration reported by the backend
        duration_ms: Option<u64>,
    },
}

impl AgentEvent {
    /// Short kind name used in logs and metrics labels
    pub fn kind(&self) -> &'static str {
        match self {
            AgentEvent::Text(_) => "text",
            AgentEvent::Thinking(_) => "thinking",
            AgentEvent::ToolStart { .. } => "tool_start",
            AgentEvent::ToolResult { .. } => "tool_result",
            AgentEvent::SessionStarted { .. } => "session_started",
            AgentEvent::Result { .. } => "result",
        }
    }

    /// Helper for a plain text result with no usage data
    pub fn result_text(text: impl Into<String>) -> Self {
        AgentEvent::Result {
            text: text.into(),
            cost_usd: None,
            duration_ms: None,
        }
    }
}

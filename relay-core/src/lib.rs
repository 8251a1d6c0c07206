// ABOUTME: Per-channel session orchestration for streaming AI tasks.
// ABOUTME: One active task per channel, FIFO queueing, liveness deadlines, fallback retry and persistence.

pub mod commands;
pub mod config;
pub mod error;
pub mod executor;
pub mod metrics;
pub mod monitor;
pub mod queue;
pub mod registry;
pub mod retry;
pub mod store;
pub mod traits;

pub use config::OrchestratorConfig;
pub use error::{FailureKind, TaskFailure};
pub use executor::{CancelReport, ChannelStatus, Orchestrator, SubmitOutcome, Submission};
pub use monitor::{LivenessMonitor, MonitorConfig};
pub use registry::{ChannelSession, SessionRegistry, SubmitOptions};
pub use retry::RetryPolicy;
pub use store::{JsonFileStore, MemoryStore, PersistedSession, SessionMap, SessionPersistence};
pub use traits::{CompletionSummary, DeliverySink, TaskOutcome};

// Re-export relay-agent types
pub use relay_agent::{AgentEvent, TaskClient};

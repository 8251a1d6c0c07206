// ABOUTME: Root library for the relay binary: configuration, paths and the console transport
// ABOUTME: Orchestration lives in relay-core; task backends live in relay-agent

pub mod config;
pub mod console;
pub mod paths;

// Re-export the workspace crates for convenience
pub use relay_agent::{AgentEvent, BackendRegistry, TaskClient};
pub use relay_core::{Orchestrator, OrchestratorConfig};

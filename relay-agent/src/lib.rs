// ABOUTME: Streaming task client abstraction for relay.
// ABOUTME: Provides the closed event type, typed task errors and pluggable backends.

pub mod config;
pub mod error;
pub mod event;
pub mod handle;
pub mod registry;
pub mod traits;

pub mod backends;

pub use config::BackendConfig;
pub use error::TaskError;
pub use event::AgentEvent;
pub use handle::{event_channel, Diagnostics, EventSender, EventStream, TaskItem, TaskRun};
pub use registry::{BackendFactory, BackendRegistry};
pub use traits::{TaskClient, TaskOptions, TaskRequest};

// ABOUTME: TaskRun bundles a running task's event stream with its diagnostics buffer.
// ABOUTME: Backends feed events through a bounded channel exposed as a Send stream.

use crate::{AgentEvent, TaskError};
use futures::stream::BoxStream;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Item type produced by every task stream
pub type TaskItem = Result<AgentEvent, TaskError>;

/// Boxed, sendable stream of task items
pub type EventStream = BoxStream<'static, TaskItem>;

/// Capacity of the channel between a backend worker and its consumer
const EVENT_CHANNEL_CAPACITY: usize = 2048;

/// Default number of diagnostic lines retained per task
pub const DEFAULT_DIAGNOSTIC_LINES: usize = 40;

/// Bounded tail of diagnostic output (stderr) captured while a task runs.
///
/// Cheap to clone; all clones share one buffer.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    lines: Arc<Mutex<VecDeque<String>>>,
    capacity: usize,
}

impl Diagnostics {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity: capacity.max(1),
        }
    }

    /// Append a line, dropping the oldest once full
    pub fn push(&self, line: impl Into<String>) {
        let mut lines = self.lines.lock().unwrap_or_else(|e| e.into_inner());
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(line.into());
    }

    /// Captured lines joined with newlines
    pub fn excerpt(&self) -> String {
        let lines = self.lines.lock().unwrap_or_else(|e| e.into_inner());
        lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
    }

    pub fn is_empty(&self) -> bool {
        self.lines
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_empty()
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new(DEFAULT_DIAGNOSTIC_LINES)
    }
}

/// A started task: its event stream and the diagnostics it captures
pub struct TaskRun {
    pub events: EventStream,
    pub diagnostics: Diagnostics,
}

impl TaskRun {
    pub fn new(events: EventStream, diagnostics: Diagnostics) -> Self {
        Self {
            events,
            diagnostics,
        }
    }

    /// A run that fails immediately with the given error
    pub fn failed(error: TaskError) -> Self {
        Self::new(
            Box::pin(tokio_stream::once(Err(error))),
            Diagnostics::default(),
        )
    }
}

/// Sending half used by backend workers
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::Sender<TaskItem>,
}

impl EventSender {
    /// Send an event; returns false once the consumer is gone
    pub async fn event(&self, event: AgentEvent) -> bool {
        self.tx.send(Ok(event)).await.is_ok()
    }

    /// Terminate the stream with an error
    pub async fn fail(&self, error: TaskError) {
        if self.tx.send(Err(error)).await.is_err() {
            tracing::debug!("Event receiver closed before failure could be reported");
        }
    }

    /// Resolves when the consumer drops the stream
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

/// Create a connected sender/stream pair
pub fn event_channel() -> (EventSender, EventStream) {
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    (EventSender { tx }, Box::pin(ReceiverStream::new(rx)))
}

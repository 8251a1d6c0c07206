// ABOUTME: Mock backend for testing - plays back pre-configured scripts of steps.
// ABOUTME: Records every request so tests can assert on prompts, models and resume ids.
//!
//! # Example
//!
//! ```no_run
//! use relay_agent::backends::mock::{MockBackend, Step};
//! use relay_agent::{AgentEvent, TaskError};
//! use std::time::Duration;
//!
//! let mock = MockBackend::new()
//!     .on_prompt("hello").respond_text("Hi there!")
//!     .on_prompt("slow").respond_steps(vec![
//!         Step::Emit(AgentEvent::Text("working".to_string())),
//!         Step::Wait(Duration::from_secs(5)),
//!         Step::Emit(AgentEvent::result_text("done")),
//!     ])
//!     .on_prompt("broken").respond_error(TaskError::AbnormalExit { code: 1 });
//! ```

use crate::event::AgentEvent;
use crate::handle::{event_channel, Diagnostics, EventSender, TaskRun};
use crate::traits::{TaskClient, TaskOptions, TaskRequest};
use crate::TaskError;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// One step of a scripted response
#[derive(Debug, Clone)]
pub enum Step {
    /// Emit an event
    Emit(AgentEvent),
    /// Sleep; cancellation interrupts the wait
    Wait(Duration),
    /// Append a line to the diagnostics buffer
    Stderr(String),
    /// End the stream with an error
    Fail(TaskError),
    /// Produce nothing until cancelled
    Hang,
    /// Produce nothing and ignore cancellation until the consumer goes away
    HangIgnoringCancel,
}

/// A request the mock received
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub working_dir: PathBuf,
    pub prompt: String,
    pub options: TaskOptions,
}

struct Expectation {
    pattern: String,
    steps: Vec<Step>,
}

/// Mock backend for testing
#[derive(Clone)]
pub struct MockBackend {
    expectations: Arc<Mutex<VecDeque<Expectation>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockBackend {
    /// Create a new mock backend with no expectations
    pub fn new() -> Self {
        Self {
            expectations: Arc::new(Mutex::new(VecDeque::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Set up an expectation for a prompt containing the given pattern
    pub fn on_prompt(self, pattern: &str) -> ExpectationBuilder {
        ExpectationBuilder {
            backend: self,
            pattern: pattern.to_string(),
        }
    }

    /// Every request received so far, in start order
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Prompts received so far, in start order
    pub fn prompts(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.prompt).collect()
    }

    /// Number of expectations not yet consumed
    pub fn pending_expectations(&self) -> usize {
        self.expectations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Factory function for the registry
    pub fn factory() -> crate::registry::BackendFactory {
        Box::new(|_config| Ok(Arc::new(MockBackend::new()) as Arc<dyn TaskClient>))
    }

    /// Match expectations with FIFO preference: check the front first,
    /// fall back to searching the queue if the front doesn't match.
    fn take_steps(&self, prompt: &str) -> Option<Vec<Step>> {
        let mut exp = self.expectations.lock().unwrap_or_else(|e| e.into_inner());
        let index = match exp.front() {
            Some(front) if prompt.contains(&front.pattern) => Some(0),
            Some(_) => exp.iter().position(|e| prompt.contains(&e.pattern)),
            None => None,
        }?;
        exp.remove(index).map(|e| e.steps)
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskClient for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn start(&self, request: TaskRequest) -> TaskRun {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedRequest {
                working_dir: request.working_dir.clone(),
                prompt: request.prompt.clone(),
                options: request.options.clone(),
            });

        let steps = self.take_steps(&request.prompt).unwrap_or_else(|| {
            vec![Step::Emit(AgentEvent::result_text(format!(
                "Mock: no expectation for '{}'",
                request.prompt
            )))]
        });

        let diagnostics = Diagnostics::default();
        let (tx, events) = event_channel();
        let worker_diagnostics = diagnostics.clone();
        let cancel = request.cancel;

        tokio::spawn(async move {
            play(steps, &tx, &worker_diagnostics, &cancel).await;
        });

        TaskRun::new(events, diagnostics)
    }
}

async fn play(
    steps: Vec<Step>,
    tx: &EventSender,
    diagnostics: &Diagnostics,
    cancel: &CancellationToken,
) {
    for step in steps {
        if cancel.is_cancelled() && !matches!(step, Step::HangIgnoringCancel) {
            tx.fail(TaskError::Aborted).await;
            return;
        }
        match step {
            Step::Emit(event) => {
                if !tx.event(event).await {
                    return;
                }
            }
            Step::Wait(duration) => {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tx.fail(TaskError::Aborted).await;
                        return;
                    }
                    _ = tokio::time::sleep(duration) => {}
                }
            }
            Step::Stderr(line) => diagnostics.push(line),
            Step::Fail(error) => {
                tx.fail(error).await;
                return;
            }
            Step::Hang => {
                tokio::select! {
                    _ = cancel.cancelled() => tx.fail(TaskError::Aborted).await,
                    _ = tx.closed() => {}
                }
                return;
            }
            Step::HangIgnoringCancel => {
                tx.closed().await;
                return;
            }
        }
    }
}

/// Builder for setting up mock expectations with a fluent API
pub struct ExpectationBuilder {
    backend: MockBackend,
    pattern: String,
}

impl ExpectationBuilder {
    /// Respond with a scripted list of steps
    pub fn respond_steps(self, steps: Vec<Step>) -> MockBackend {
        self.backend
            .expectations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Expectation {
                pattern: self.pattern,
                steps,
            });
        self.backend
    }

    /// Respond with a list of events
    pub fn respond_with(self, events: Vec<AgentEvent>) -> MockBackend {
        self.respond_steps(events.into_iter().map(Step::Emit).collect())
    }

    /// Respond with a simple text result
    pub fn respond_text(self, text: &str) -> MockBackend {
        self.respond_with(vec![
            AgentEvent::Text(text.to_string()),
            AgentEvent::result_text(text),
        ])
    }

    /// Respond with an immediate error
    pub fn respond_error(self, error: TaskError) -> MockBackend {
        self.respond_steps(vec![Step::Fail(error)])
    }
}

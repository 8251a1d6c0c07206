// ABOUTME: Liveness monitor wrapping a task's event stream with startup and activity deadlines.
// ABOUTME: On a missed deadline it cancels the task and yields a timeout failure, then ends.

use crate::error::TaskFailure;
use futures::Stream;
use pin_project_lite::pin_project;
use relay_agent::{AgentEvent, Diagnostics, TaskItem};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::{Instant, Sleep};
use tokio_util::sync::CancellationToken;

/// Deadlines applied to one task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Time allowed before the first event
    pub startup_timeout: Duration,
    /// Longest allowed gap between events once streaming
    pub activity_timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            startup_timeout: Duration::from_secs(30),
            activity_timeout: Duration::from_secs(300),
        }
    }
}

// Roughly 30 years; stands in for deadlines too large to represent
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `now + after`, saturating instead of overflowing
fn deadline_after(after: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(after)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    AwaitingFirstEvent,
    Streaming,
    Finished,
}

pin_project! {
    /// Stream adapter enforcing a [`MonitorConfig`] on a task stream.
    ///
    /// Exactly one deadline is armed at a time: the startup deadline until the
    /// first event, then the activity deadline, pushed forward on every event.
    pub struct LivenessMonitor<S> {
        #[pin]
        inner: S,
        #[pin]
        deadline: Sleep,
        phase: Phase,
        config: MonitorConfig,
        cancel: CancellationToken,
        diagnostics: Diagnostics,
    }
}

impl<S> LivenessMonitor<S>
where
    S: Stream<Item = TaskItem>,
{
    pub fn new(
        inner: S,
        config: MonitorConfig,
        cancel: CancellationToken,
        diagnostics: Diagnostics,
    ) -> Self {
        Self {
            inner,
            deadline: tokio::time::sleep_until(deadline_after(config.startup_timeout)),
            phase: Phase::AwaitingFirstEvent,
            config,
            cancel,
            diagnostics,
        }
    }
}

impl<S> Stream for LivenessMonitor<S>
where
    S: Stream<Item = TaskItem>,
{
    type Item = Result<AgentEvent, TaskFailure>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        if *this.phase == Phase::Finished {
            return Poll::Ready(None);
        }

        // Inner first: an event that is already waiting must win over an elapsed deadline
        match this.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(event))) => {
                if *this.phase == Phase::AwaitingFirstEvent {
                    tracing::debug!("First event received - startup deadline disarmed");
                }
                *this.phase = Phase::Streaming;
                this.deadline
                    .as_mut()
                    .reset(deadline_after(this.config.activity_timeout));
                return Poll::Ready(Some(Ok(event)));
            }
            Poll::Ready(Some(Err(error))) => {
                *this.phase = Phase::Finished;
                return Poll::Ready(Some(Err(TaskFailure::from_task_error(
                    error,
                    this.diagnostics.excerpt(),
                ))));
            }
            Poll::Ready(None) => {
                *this.phase = Phase::Finished;
                return Poll::Ready(None);
            }
            Poll::Pending => {}
        }

        if this.deadline.as_mut().poll(cx).is_pending() {
            return Poll::Pending;
        }

        let failure = match *this.phase {
            Phase::AwaitingFirstEvent => {
                tracing::warn!(
                    timeout_secs = this.config.startup_timeout.as_secs(),
                    "Task produced no output before startup deadline - aborting"
                );
                crate::metrics::record_timeout("startup");
                TaskFailure::startup_timeout(this.config.startup_timeout, this.diagnostics.excerpt())
            }
            _ => {
                tracing::warn!(
                    timeout_secs = this.config.activity_timeout.as_secs(),
                    "Task went silent past activity deadline - aborting"
                );
                crate::metrics::record_timeout("activity");
                TaskFailure::activity_timeout(
                    this.config.activity_timeout,
                    this.diagnostics.excerpt(),
                )
            }
        };
        this.cancel.cancel();
        *this.phase = Phase::Finished;
        Poll::Ready(Some(Err(failure)))
    }
}

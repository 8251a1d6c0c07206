// ABOUTME: Per-channel task executor: at most one task per channel, FIFO queue for the rest.
// ABOUTME: Runs each task under the liveness monitor, retries once on fallback, persists and notifies.

use crate::config::OrchestratorConfig;
use crate::error::{FailureKind, TaskFailure};
use crate::metrics;
use crate::monitor::LivenessMonitor;
use crate::registry::{ChannelSession, QueuedInput, SessionRegistry, SubmitOptions};
use crate::retry::RetryPolicy;
use crate::store::SessionPersistence;
use crate::traits::{CompletionSummary, DeliverySink, TaskOutcome};
use relay_agent::{AgentEvent, TaskClient, TaskOptions, TaskRequest};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

/// One user input addressed to a channel
pub struct Submission {
    pub channel_key: String,
    pub label: String,
    pub prompt: String,
    pub sink: Arc<dyn DeliverySink>,
    pub options: SubmitOptions,
}

impl Submission {
    pub fn new(
        channel_key: impl Into<String>,
        prompt: impl Into<String>,
        sink: Arc<dyn DeliverySink>,
    ) -> Self {
        Self {
            channel_key: channel_key.into(),
            label: String::new(),
            prompt: prompt.into(),
            sink,
            options: SubmitOptions::default(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_options(mut self, options: SubmitOptions) -> Self {
        self.options = options;
        self
    }
}

/// What `submit` did with an input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The channel was idle and the task started
    Dispatched,
    /// The channel was busy; 1-based position in its queue
    Queued { position: usize },
}

/// Result of a cancel or reset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CancelReport {
    /// A running task was signalled
    pub cancelled: bool,
    /// Queued inputs dropped
    pub discarded: usize,
}

/// Point-in-time view of one channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelStatus {
    pub key: String,
    pub label: String,
    pub busy: bool,
    pub queue_len: usize,
    pub session_id: Option<String>,
    pub working_dir: PathBuf,
}

impl ChannelStatus {
    fn of(session: &ChannelSession) -> Self {
        let state = session.lock_state();
        Self {
            key: session.key().to_string(),
            label: state.label.clone(),
            busy: state.active.is_some(),
            queue_len: state.queue.len(),
            session_id: state.session_id.clone(),
            working_dir: session.working_dir().to_path_buf(),
        }
    }
}

/// A dispatched input together with the handle it runs under
struct Job {
    prompt: String,
    sink: Arc<dyn DeliverySink>,
    options: SubmitOptions,
    token: CancellationToken,
    generation: u64,
}

struct Inner {
    registry: SessionRegistry,
    client: Arc<dyn TaskClient>,
    store: Arc<dyn SessionPersistence>,
    config: OrchestratorConfig,
    retry: RetryPolicy,
    // Channel worker loops still running, retired ones included
    workers: AtomicUsize,
    // Signalled whenever a worker loop exits
    settled: Notify,
}

/// Routes inputs to per-channel tasks. Cheap to clone.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(
        client: Arc<dyn TaskClient>,
        store: Arc<dyn SessionPersistence>,
        workspace: impl Into<PathBuf>,
        config: OrchestratorConfig,
    ) -> Self {
        let retry = config.retry_policy();
        Self {
            inner: Arc::new(Inner {
                registry: SessionRegistry::new(workspace),
                client,
                store,
                config,
                retry,
                workers: AtomicUsize::new(0),
                settled: Notify::new(),
            }),
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.inner.registry
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.inner.config
    }

    /// Load persisted session ids. Returns how many were restored.
    pub async fn restore(&self) -> usize {
        self.inner.registry.load(self.inner.store.as_ref()).await
    }

    /// Start the input now if the channel is idle, otherwise queue it.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit(&self, submission: Submission) -> SubmitOutcome {
        let Submission {
            channel_key,
            label,
            prompt,
            sink,
            options,
        } = submission;
        let session = self.inner.registry.get_or_create(&channel_key, &label);

        // Busy check and enqueue share one critical section
        let (token, generation) = {
            let mut state = session.lock_state();
            if state.active.is_some() {
                let position = state.queue.push(QueuedInput {
                    prompt,
                    sink,
                    options,
                });
                drop(state);
                tracing::info!(channel = %channel_key, position, "Channel busy - input queued");
                metrics::record_queued();
                return SubmitOutcome::Queued { position };
            }
            state.activate()
        };

        tracing::info!(channel = %channel_key, generation, "Dispatching task");
        let job = Job {
            prompt,
            sink,
            options,
            token,
            generation,
        };
        self.inner.workers.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(self.clone().run_channel(session, job));
        SubmitOutcome::Dispatched
    }

    /// Abort the running task, drop the queue and forget the session id.
    ///
    /// A no-op on an idle channel. The channel accepts new input as soon as
    /// this returns; the aborted task still reports to its own sink.
    pub async fn cancel(&self, channel_key: &str) -> CancelReport {
        let Some(session) = self.inner.registry.get(channel_key) else {
            return CancelReport::default();
        };

        let report = {
            let mut state = session.lock_state();
            match state.active.take() {
                Some(active) => {
                    active.token.cancel();
                    state.set_session_id(None);
                    CancelReport {
                        cancelled: true,
                        discarded: state.queue.clear(),
                    }
                }
                None => CancelReport::default(),
            }
        };

        if report.cancelled {
            tracing::info!(
                channel = %channel_key,
                discarded = report.discarded,
                "Cancelled running task"
            );
            metrics::record_cancel(report.discarded);
            self.persist().await;
        }
        report
    }

    /// Start over: cancel anything running and clear the session id, even when idle
    pub async fn reset(&self, channel_key: &str) -> CancelReport {
        let Some(session) = self.inner.registry.get(channel_key) else {
            return CancelReport::default();
        };

        let (report, had_session) = {
            let mut state = session.lock_state();
            let cancelled = match state.active.take() {
                Some(active) => {
                    active.token.cancel();
                    true
                }
                None => false,
            };
            let report = CancelReport {
                cancelled,
                discarded: state.queue.clear(),
            };
            let had_session = state.session_id.is_some();
            state.set_session_id(None);
            (report, had_session)
        };

        tracing::info!(
            channel = %channel_key,
            cancelled = report.cancelled,
            discarded = report.discarded,
            "Channel session reset"
        );
        if report.cancelled {
            metrics::record_cancel(report.discarded);
        }
        if report.cancelled || had_session {
            self.persist().await;
        }
        report
    }

    pub fn is_busy(&self, channel_key: &str) -> bool {
        self.inner
            .registry
            .get(channel_key)
            .is_some_and(|session| session.is_busy())
    }

    pub fn queue_len(&self, channel_key: &str) -> usize {
        self.inner
            .registry
            .get(channel_key)
            .map_or(0, |session| session.queue_len())
    }

    pub fn status(&self, channel_key: &str) -> Option<ChannelStatus> {
        self.inner
            .registry
            .get(channel_key)
            .map(|session| ChannelStatus::of(&session))
    }

    /// Status of every known channel, sorted by key
    pub fn channels(&self) -> Vec<ChannelStatus> {
        self.inner
            .registry
            .channels()
            .iter()
            .map(|session| ChannelStatus::of(session))
            .collect()
    }

    /// Wait until every dispatched task, cancelled ones included, has
    /// delivered its outcome and no queued input remains
    pub async fn wait_idle(&self) {
        loop {
            // Register before checking so an exit in between is not missed
            let mut settled = std::pin::pin!(self.inner.settled.notified());
            settled.as_mut().enable();
            if self.inner.workers.load(Ordering::SeqCst) == 0 {
                return;
            }
            settled.await;
        }
    }

    async fn persist(&self) -> bool {
        self.inner.registry.save(self.inner.store.as_ref()).await
    }

    /// Worker loop for one channel: run, settle, then drain the queue in order
    async fn run_channel(self, session: Arc<ChannelSession>, first: Job) {
        let key = session.key().to_string();
        let mut job = first;

        loop {
            let outcome = self.execute(&session, &job).await;

            // Settle: record the session id, retire the handle and claim the
            // next queued input in one critical section
            let (outcome, current, next) = {
                let mut state = session.lock_state();
                if state.is_current(job.generation) {
                    if let TaskOutcome::Completed(summary) = &outcome {
                        if let Some(session_id) = &summary.session_id {
                            state.set_session_id(Some(session_id.clone()));
                        }
                    }
                    state.active = None;
                    let next = state.queue.pop().map(|input| {
                        let (token, generation) = state.activate();
                        Job {
                            prompt: input.prompt,
                            sink: input.sink,
                            options: input.options,
                            token,
                            generation,
                        }
                    });
                    (outcome, true, next)
                } else {
                    (retired(outcome), false, None)
                }
            };

            if current && outcome.is_success() {
                self.persist().await;
            }
            metrics::record_outcome(outcome_label(&outcome));
            log_outcome(&key, &outcome);
            if let Err(e) = job.sink.notify(&key, &outcome).await {
                tracing::warn!(channel = %key, error = %e, "Failed to deliver task outcome");
                metrics::record_error("delivery");
            }

            let Some(next) = next else {
                if current {
                    tracing::debug!(channel = %key, "Queue drained - channel idle");
                }
                self.inner.workers.fetch_sub(1, Ordering::SeqCst);
                self.inner.settled.notify_waiters();
                return;
            };
            tracing::info!(
                channel = %key,
                generation = next.generation,
                remaining = session.queue_len(),
                "Dispatching queued input"
            );
            job = next;
        }
    }

    /// Run one job to its terminal outcome, with at most one fallback retry
    async fn execute(&self, session: &ChannelSession, job: &Job) -> TaskOutcome {
        let key = session.key();

        if let Err(e) = tokio::fs::create_dir_all(session.working_dir()).await {
            return TaskOutcome::Failed(TaskFailure::other(format!(
                "Failed to create working directory {}: {}",
                session.working_dir().display(),
                e
            )));
        }

        let options = self.task_options(session, &job.options);
        let started = Instant::now();
        metrics::record_dispatch(self.inner.client.name());

        let retry = &self.inner.retry;
        let result = match self.attempt(session, job, options, 1).await {
            Err(failure) if !job.token.is_cancelled() && retry.should_retry(&failure) => {
                let model = retry.fallback_model.clone();
                tracing::warn!(
                    channel = %key,
                    kind = %failure.kind,
                    model = %model,
                    "Task crashed - retrying once on fallback model without resume"
                );
                metrics::record_retry();
                match self.attempt(session, job, retry.fallback_options(), 2).await {
                    Ok(mut summary) => {
                        summary.fallback_model = Some(model);
                        Ok(summary)
                    }
                    Err(second) => Err(second.with_prior_attempt(&failure, &model)),
                }
            }
            other => other,
        };

        match result {
            Ok(mut summary) => {
                let elapsed = started.elapsed();
                if summary.duration_ms.is_none() {
                    summary.duration_ms = Some(elapsed.as_millis() as u64);
                }
                metrics::record_task_duration(elapsed.as_secs_f64());
                if let Some(cost) = summary.cost_usd {
                    metrics::record_cost_cents((cost * 100.0).round() as u64);
                }
                TaskOutcome::Completed(summary)
            }
            Err(failure) => TaskOutcome::Failed(failure),
        }
    }

    fn task_options(&self, session: &ChannelSession, options: &SubmitOptions) -> TaskOptions {
        // Continuing the directory's latest conversation replaces resuming a stored id
        let resume_session_id = if options.fresh_session || options.continue_conversation {
            None
        } else {
            session.session_id()
        };
        TaskOptions {
            resume_session_id,
            continue_conversation: options.continue_conversation,
            model: options
                .model
                .clone()
                .or_else(|| self.inner.config.model.clone()),
        }
    }

    /// One run of the external task, streamed to the sink in batches
    async fn attempt(
        &self,
        session: &ChannelSession,
        job: &Job,
        options: TaskOptions,
        attempt: u32,
    ) -> Result<CompletionSummary, TaskFailure> {
        let key = session.key();
        tracing::debug!(
            channel = %key,
            attempt,
            resume = options.resume_session_id.as_deref().unwrap_or("-"),
            model = options.model.as_deref().unwrap_or("default"),
            "Starting task"
        );

        let run = self.inner.client.start(TaskRequest {
            working_dir: session.working_dir().to_path_buf(),
            prompt: job.prompt.clone(),
            cancel: job.token.clone(),
            options,
        });
        let monitored = LivenessMonitor::new(
            run.events,
            self.inner.config.monitor_config(),
            job.token.clone(),
            run.diagnostics,
        );
        let mut batches = std::pin::pin!(monitored.chunks_timeout(
            self.inner.config.batch_size,
            self.inner.config.flush_interval(),
        ));

        let mut summary = CompletionSummary::default();
        let mut failure = None;
        while let Some(batch) = batches.next().await {
            let mut events: Vec<AgentEvent> = Vec::with_capacity(batch.len());
            for item in batch {
                match item {
                    Ok(event) => {
                        if let AgentEvent::ToolStart { name, .. } = &event {
                            metrics::record_tool_used(name);
                        }
                        summary.observe(&event);
                        events.push(event);
                    }
                    Err(f) => failure = Some(f),
                }
            }
            if !events.is_empty() {
                if let Err(e) = job.sink.deliver(key, &events).await {
                    tracing::warn!(channel = %key, error = %e, "Failed to deliver events");
                    metrics::record_error("delivery");
                }
            }
        }

        match failure {
            Some(failure) => Err(failure),
            None => Ok(summary),
        }
    }
}

/// Outcome reported for a task whose handle was retired by a cancel
fn retired(outcome: TaskOutcome) -> TaskOutcome {
    match outcome {
        TaskOutcome::Failed(failure) if failure.is_aborted() => TaskOutcome::Failed(failure),
        TaskOutcome::Failed(failure) => {
            TaskOutcome::Failed(TaskFailure::aborted(failure.diagnostics))
        }
        TaskOutcome::Completed(_) => TaskOutcome::Failed(TaskFailure::aborted("")),
    }
}

fn outcome_label(outcome: &TaskOutcome) -> &'static str {
    match outcome {
        TaskOutcome::Completed(_) => "completed",
        TaskOutcome::Failed(failure) => match failure.kind {
            FailureKind::StartupTimeout => "startup_timeout",
            FailureKind::ActivityTimeout => "activity_timeout",
            FailureKind::Aborted => "aborted",
            FailureKind::AbnormalExit(_) => "abnormal_exit",
            FailureKind::Other => "other",
        },
    }
}

fn log_outcome(key: &str, outcome: &TaskOutcome) {
    match outcome {
        TaskOutcome::Completed(summary) => tracing::info!(
            channel = %key,
            events = summary.events,
            duration_ms = summary.duration_ms.unwrap_or(0),
            fallback = summary.fallback_model.is_some(),
            "Task completed"
        ),
        TaskOutcome::Failed(failure) if failure.is_aborted() => {
            tracing::info!(channel = %key, "Task aborted")
        }
        TaskOutcome::Failed(failure) => tracing::warn!(
            channel = %key,
            kind = %failure.kind,
            error = %failure.message,
            "Task failed"
        ),
    }
}

// ABOUTME: Metric recording helpers for the orchestrator.
// ABOUTME: Thin wrappers over the `metrics` facade; a no-op unless a recorder is installed.

use metrics::{counter, histogram};

/// A task started running on a channel
pub fn record_dispatch(backend: &'static str) {
    counter!("relay_tasks_dispatched_total", "backend" => backend).increment(1);
}

/// An input was queued behind a running task
pub fn record_queued() {
    counter!("relay_inputs_queued_total").increment(1);
}

/// A task reached its terminal outcome
pub fn record_outcome(outcome: &'static str) {
    counter!("relay_task_outcomes_total", "outcome" => outcome).increment(1);
}

/// Fallback retry issued
pub fn record_retry() {
    counter!("relay_fallback_retries_total").increment(1);
}

/// Liveness deadline missed ("startup" or "activity")
pub fn record_timeout(kind: &'static str) {
    counter!("relay_task_timeouts_total", "kind" => kind).increment(1);
}

/// Explicit cancel or reset, with the number of queued inputs it discarded
pub fn record_cancel(discarded: usize) {
    counter!("relay_cancels_total").increment(1);
    counter!("relay_inputs_discarded_total").increment(discarded as u64);
}

/// Task cost in cents
pub fn record_cost_cents(cents: u64) {
    counter!("relay_task_cost_cents_total").increment(cents);
}

/// End-to-end task duration
pub fn record_task_duration(seconds: f64) {
    histogram!("relay_task_duration_seconds").record(seconds);
}

/// Non-fatal error by source ("delivery", "persist", ...)
pub fn record_error(source: &'static str) {
    counter!("relay_errors_total", "source" => source).increment(1);
}

/// Chat command handled by a transport
pub fn record_command(command: &'static str) {
    counter!("relay_commands_total", "command" => command).increment(1);
}

/// Tool invocation reported by the assistant
pub fn record_tool_used(tool: &str) {
    counter!("relay_tools_used_total", "tool" => tool.to_string()).increment(1);
}

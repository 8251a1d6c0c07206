// ABOUTME: Console chat transport: reads lines from stdin, renders task output to stdout.
// ABOUTME: "@channel text" addresses another channel; "!command" lines drive the orchestrator.

use anyhow::{Context, Result};
use async_trait::async_trait;
use relay_core::commands::{help_text, parse_message, ChatCommand, ParseResult};
use relay_core::{
    metrics, AgentEvent, ChannelStatus, DeliverySink, Orchestrator, SubmitOptions, SubmitOutcome,
    Submission, TaskOutcome,
};
use std::io::Write;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Longest tool input preview shown inline
const PREVIEW_CHARS: usize = 60;

/// Renders events and outcomes as prefixed lines on a writer
pub struct ConsoleSink<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    fn write_lines(&self, lines: &[String]) -> Result<()> {
        if lines.is_empty() {
            return Ok(());
        }
        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        for line in lines {
            writeln!(out, "{}", line).context("Failed to write to console")?;
        }
        out.flush().context("Failed to flush console")
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl<W: Write + Send> DeliverySink for ConsoleSink<W> {
    async fn deliver(&self, channel_key: &str, batch: &[AgentEvent]) -> Result<()> {
        let lines: Vec<String> = batch
            .iter()
            .filter_map(|event| render_event(channel_key, event))
            .collect();
        self.write_lines(&lines)
    }

    async fn notify(&self, channel_key: &str, outcome: &TaskOutcome) -> Result<()> {
        self.write_lines(&[render_outcome(channel_key, outcome)])
    }
}

/// One console line, or `None` for events with nothing to show
pub fn render_event(channel_key: &str, event: &AgentEvent) -> Option<String> {
    match event {
        AgentEvent::Text(text) => Some(format!("[{}] {}", channel_key, text.trim_end())),
        AgentEvent::Thinking(text) => Some(format!(
            "[{}] (thinking) {}",
            channel_key,
            truncate(text.trim(), PREVIEW_CHARS)
        )),
        AgentEvent::ToolStart { name, input, .. } => {
            let preview = input
                .as_object()
                .and_then(|o| {
                    o.get("command")
                        .or(o.get("file_path"))
                        .or(o.get("pattern"))
                })
                .and_then(|v| v.as_str())
                .map(|s| truncate(s, PREVIEW_CHARS))
                .unwrap_or_default();
            if preview.is_empty() {
                Some(format!("[{}] tool: {}", channel_key, name))
            } else {
                Some(format!("[{}] tool: {} - {}", channel_key, name, preview))
            }
        }
        AgentEvent::ToolResult { success: false, .. } => {
            Some(format!("[{}] tool reported an error", channel_key))
        }
        AgentEvent::ToolResult { success: true, .. } => None,
        AgentEvent::SessionStarted { session_id } => {
            tracing::debug!(channel = %channel_key, session_id = %session_id, "Session announced");
            None
        }
        // Text already arrived as Text events
        AgentEvent::Result { .. } => None,
    }
}

/// Terminal line for a task
pub fn render_outcome(channel_key: &str, outcome: &TaskOutcome) -> String {
    match outcome {
        TaskOutcome::Completed(summary) => {
            let mut line = format!("[{}] done", channel_key);
            if let Some(ms) = summary.duration_ms {
                line.push_str(&format!(" in {:.1}s", ms as f64 / 1000.0));
            }
            if let Some(cost) = summary.cost_usd {
                line.push_str(&format!(" (${:.4})", cost));
            }
            if let Some(model) = &summary.fallback_model {
                line.push_str(&format!(" [recovered on {}]", model));
            }
            line
        }
        TaskOutcome::Failed(failure) if failure.is_aborted() => {
            format!("[{}] cancelled", channel_key)
        }
        TaskOutcome::Failed(failure) => {
            let mut line = format!("[{}] failed ({}): {}", channel_key, failure.kind, failure.message);
            for diag in failure.diagnostics.lines().filter(|l| !l.trim().is_empty()) {
                line.push_str("\n    ");
                line.push_str(diag);
            }
            line
        }
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max).collect();
        format!("{}...", cut)
    }
}

/// A console line after channel addressing is resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleInput<'a> {
    /// `@name` on its own: make `name` the current channel
    Switch(String),
    /// Text for a channel (the current one unless `@name text` was used)
    Line { channel: String, body: &'a str },
}

pub fn parse_input<'a>(line: &'a str, current: &str) -> ConsoleInput<'a> {
    let trimmed = line.trim();
    if let Some(rest) = trimmed.strip_prefix('@') {
        let (name, body) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        if !name.is_empty() {
            let body = body.trim();
            if body.is_empty() {
                return ConsoleInput::Switch(name.to_string());
            }
            return ConsoleInput::Line {
                channel: name.to_string(),
                body,
            };
        }
    }
    ConsoleInput::Line {
        channel: current.to_string(),
        body: trimmed,
    }
}

fn format_status(status: &ChannelStatus) -> String {
    let state = if status.busy { "busy" } else { "idle" };
    let label = if status.label.is_empty() || status.label == status.key {
        String::new()
    } else {
        format!(" ({})", status.label)
    };
    format!(
        "{}{}: {}, {} queued, session {}, dir {}",
        status.key,
        label,
        state,
        status.queue_len,
        status.session_id.as_deref().unwrap_or("none"),
        status.working_dir.display()
    )
}

/// Drives an orchestrator from line-oriented input
pub struct Console {
    orchestrator: Orchestrator,
    sink: Arc<dyn DeliverySink>,
    current: String,
}

impl Console {
    pub fn new(orchestrator: Orchestrator, sink: Arc<dyn DeliverySink>, channel: &str) -> Self {
        Self {
            orchestrator,
            sink,
            current: channel.to_string(),
        }
    }

    pub fn current_channel(&self) -> &str {
        &self.current
    }

    /// Handle one line; returns a reply to print, if any
    pub async fn handle_line(&mut self, line: &str) -> Option<String> {
        let (channel, body) = match parse_input(line, &self.current) {
            ConsoleInput::Switch(channel) => {
                self.current = channel;
                return Some(format!("Now talking in [{}]", self.current));
            }
            ConsoleInput::Line { channel, body } => (channel, body),
        };

        match parse_message(body) {
            ParseResult::Ignore => None,
            ParseResult::Message(prompt) => self.submit(&channel, prompt, SubmitOptions::default()),
            ParseResult::Command(command) => {
                let command = command.as_chat_command();
                metrics::record_command(command.name());
                tracing::debug!(channel = %channel, command = command.name(), "Handling command");
                self.run_command(&channel, command).await
            }
        }
    }

    fn submit(&self, channel: &str, prompt: String, options: SubmitOptions) -> Option<String> {
        let submission = Submission::new(channel, prompt, Arc::clone(&self.sink))
            .with_label(channel)
            .with_options(options);
        match self.orchestrator.submit(submission) {
            SubmitOutcome::Dispatched => None,
            SubmitOutcome::Queued { position } => Some(format!(
                "[{}] busy - queued at position {}",
                channel, position
            )),
        }
    }

    async fn run_command(&self, channel: &str, command: ChatCommand) -> Option<String> {
        let reply = match command {
            ChatCommand::Cancel => {
                let report = self.orchestrator.cancel(channel).await;
                if report.cancelled {
                    format!(
                        "[{}] cancelling; dropped {} queued message(s)",
                        channel, report.discarded
                    )
                } else {
                    format!("[{}] nothing is running", channel)
                }
            }
            ChatCommand::NewSession => {
                let report = self.orchestrator.reset(channel).await;
                let mut reply = format!("[{}] session cleared - next message starts fresh", channel);
                if report.cancelled {
                    reply.push_str(&format!(
                        " (cancelled running task, dropped {} queued)",
                        report.discarded
                    ));
                }
                reply
            }
            ChatCommand::Status => match self.orchestrator.status(channel) {
                Some(status) => format_status(&status),
                None => format!("{}: no activity yet", channel),
            },
            ChatCommand::Channels => {
                let channels = self.orchestrator.channels();
                if channels.is_empty() {
                    "No channels yet".to_string()
                } else {
                    channels
                        .iter()
                        .map(format_status)
                        .collect::<Vec<_>>()
                        .join("\n")
                }
            }
            ChatCommand::Help => help_text().to_string(),
            ChatCommand::Continue { prompt } => {
                let options = SubmitOptions {
                    continue_conversation: true,
                    ..Default::default()
                };
                return self.submit(channel, prompt, options);
            }
            ChatCommand::Unknown(name) => format!("Unknown command: {}\n{}", name, help_text()),
        };
        Some(reply)
    }

    /// Read lines until EOF, then wait for running tasks to settle
    pub async fn run<R>(mut self, input: R) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();
        while let Some(line) = lines.next_line().await.context("Failed to read input")? {
            if let Some(reply) = self.handle_line(&line).await {
                println!("{}", reply);
            }
        }

        tracing::info!("Input closed - waiting for running tasks");
        self.orchestrator.wait_idle().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::{CompletionSummary, FailureKind, TaskFailure};
    use serde_json::json;

    #[test]
    fn test_parse_input_addresses_channels() {
        assert_eq!(
            parse_input("hello", "main"),
            ConsoleInput::Line {
                channel: "main".to_string(),
                body: "hello"
            }
        );
        assert_eq!(
            parse_input("@ops  restart it", "main"),
            ConsoleInput::Line {
                channel: "ops".to_string(),
                body: "restart it"
            }
        );
        assert_eq!(
            parse_input("@ops", "main"),
            ConsoleInput::Switch("ops".to_string())
        );
        assert_eq!(
            parse_input("@ hi", "main"),
            ConsoleInput::Line {
                channel: "main".to_string(),
                body: "@ hi"
            }
        );
    }

    #[test]
    fn test_render_tool_start_preview() {
        let event = AgentEvent::ToolStart {
            id: "t1".to_string(),
            name: "Bash".to_string(),
            input: json!({"command": "cargo fmt"}),
        };
        assert_eq!(
            render_event("main", &event).unwrap(),
            "[main] tool: Bash - cargo fmt"
        );
    }

    #[test]
    fn test_render_skips_quiet_events() {
        assert!(render_event("main", &AgentEvent::result_text("x")).is_none());
        assert!(render_event(
            "main",
            &AgentEvent::SessionStarted {
                session_id: "s".to_string()
            }
        )
        .is_none());
    }

    #[test]
    fn test_render_outcomes() {
        let done = TaskOutcome::Completed(CompletionSummary {
            duration_ms: Some(1500),
            cost_usd: Some(0.01),
            fallback_model: Some("sonnet".to_string()),
            ..Default::default()
        });
        assert_eq!(
            render_outcome("main", &done),
            "[main] done in 1.5s ($0.0100) [recovered on sonnet]"
        );

        let failed = TaskOutcome::Failed(TaskFailure::new(
            FailureKind::AbnormalExit(1),
            "process exited with code 1",
            "line one\nline two",
        ));
        let rendered = render_outcome("main", &failed);
        assert!(rendered.starts_with("[main] failed (abnormal_exit(1))"));
        assert!(rendered.contains("\n    line two"));

        let aborted = TaskOutcome::Failed(TaskFailure::aborted(""));
        assert_eq!(render_outcome("main", &aborted), "[main] cancelled");
    }

    #[test]
    fn test_truncate_counts_chars() {
        assert_eq!(truncate("héllo", 10), "héllo");
        assert_eq!(truncate("héllo", 2), "hé...");
    }

    #[tokio::test]
    async fn test_sink_writes_lines() {
        let sink = ConsoleSink::new(Vec::new());
        sink.deliver("main", &[AgentEvent::Text("hi\n".to_string())])
            .await
            .unwrap();
        sink.notify("main", &TaskOutcome::Failed(TaskFailure::aborted("")))
            .await
            .unwrap();
        let written = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(written, "[main] hi\n[main] cancelled\n");
    }
}

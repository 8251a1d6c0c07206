// ABOUTME: Direct CLI backend - spawns claude with --print --output-format stream-json.
// ABOUTME: Parses streaming JSONL from stdout into AgentEvents and kills the child on cancel.

use crate::event::AgentEvent;
use crate::handle::{event_channel, Diagnostics, EventSender, TaskRun, DEFAULT_DIAGNOSTIC_LINES};
use crate::traits::{TaskClient, TaskRequest};
use crate::TaskError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command as ProcessCommand};
use tokio::task::JoinHandle;

/// Configuration for the Direct CLI backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectCliConfig {
    /// Path to the claude binary
    #[serde(default = "default_binary")]
    pub binary: String,
    /// Optional SDK URL for the claude CLI
    #[serde(default)]
    pub sdk_url: Option<String>,
    /// Pass --dangerously-skip-permissions (the relay has no way to answer prompts)
    #[serde(default = "default_skip_permissions")]
    pub skip_permissions: bool,
    /// Extra arguments inserted before the prompt
    #[serde(default)]
    pub extra_args: Vec<String>,
    /// How many stderr lines to keep for error reports
    #[serde(default = "default_diagnostic_lines")]
    pub diagnostic_lines: usize,
}

fn default_binary() -> String {
    "claude".to_string()
}

fn default_skip_permissions() -> bool {
    true
}

fn default_diagnostic_lines() -> usize {
    DEFAULT_DIAGNOSTIC_LINES
}

impl Default for DirectCliConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            sdk_url: None,
            skip_permissions: default_skip_permissions(),
            extra_args: Vec::new(),
            diagnostic_lines: default_diagnostic_lines(),
        }
    }
}

pub struct DirectCliBackend {
    config: DirectCliConfig,
}

impl DirectCliBackend {
    pub fn new(config: DirectCliConfig) -> anyhow::Result<Self> {
        // Validate binary path doesn't contain suspicious characters
        if config.binary.contains("..") || config.binary.contains('\0') {
            anyhow::bail!("Invalid claude binary path: {}", config.binary);
        }
        Ok(Self { config })
    }

    /// Factory function for the registry
    pub fn factory() -> crate::registry::BackendFactory {
        Box::new(|config| {
            let cfg: DirectCliConfig = serde_json::from_value(config.clone())?;
            let backend = DirectCliBackend::new(cfg)?;
            Ok(Arc::new(backend) as Arc<dyn TaskClient>)
        })
    }
}

impl TaskClient for DirectCliBackend {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn start(&self, request: TaskRequest) -> TaskRun {
        let diagnostics = Diagnostics::new(self.config.diagnostic_lines);
        let (tx, events) = event_channel();
        let config = self.config.clone();
        let worker_diagnostics = diagnostics.clone();

        tokio::spawn(async move {
            if let Err(err) = run_prompt(&config, request, &tx, &worker_diagnostics).await {
                tracing::warn!(error = %err, "Direct CLI task ended with error");
                tx.fail(err).await;
            }
        });

        TaskRun::new(events, diagnostics)
    }
}

/// Build the CLI argument list for one request
pub fn build_args(config: &DirectCliConfig, request: &TaskRequest) -> Vec<String> {
    let mut args = vec![
        "--print".to_string(),
        "--output-format".to_string(),
        "stream-json".to_string(),
        "--verbose".to_string(),
    ];

    if config.skip_permissions {
        args.push("--dangerously-skip-permissions".to_string());
    }

    // An explicit resume wins over --continue
    if let Some(ref session_id) = request.options.resume_session_id {
        args.push("--resume".to_string());
        args.push(session_id.clone());
    } else if request.options.continue_conversation {
        args.push("--continue".to_string());
    }

    if let Some(ref model) = request.options.model {
        args.push("--model".to_string());
        args.push(model.clone());
    }

    if let Some(ref url) = config.sdk_url {
        args.push("--sdk-url".to_string());
        args.push(url.clone());
    }

    args.extend(config.extra_args.iter().cloned());
    args.push(request.prompt.clone());
    args
}

async fn run_prompt(
    config: &DirectCliConfig,
    request: TaskRequest,
    event_tx: &EventSender,
    diagnostics: &Diagnostics,
) -> Result<(), TaskError> {
    let args = build_args(config, &request);

    tracing::debug!(?args, working_dir = %request.working_dir.display(), "Spawning Claude CLI");

    let mut child = ProcessCommand::new(&config.binary)
        .args(&args)
        .current_dir(&request.working_dir)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| TaskError::other(format!("Failed to spawn Claude CLI: {}", e)))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| TaskError::other("Failed to capture stdout"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| TaskError::other("Failed to capture stderr"))?;

    // Stderr goes to the diagnostics tail; joined before we report the exit status
    let stderr_diagnostics = diagnostics.clone();
    let stderr_handle = tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if !line.is_empty() {
                tracing::warn!(stderr = %line, "Claude CLI stderr");
                stderr_diagnostics.push(line);
            }
        }
    });

    let mut lines = BufReader::new(stdout).lines();
    let mut state = ParseState::default();

    loop {
        tokio::select! {
            biased;
            _ = request.cancel.cancelled() => {
                tracing::info!("Cancellation requested - killing Claude CLI");
                stop_child(&mut child, stderr_handle).await;
                return Err(TaskError::Aborted);
            }
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => return Err(e.into()),
                };
                if line.is_empty() {
                    continue;
                }
                let json = match serde_json::from_str::<Value>(&line) {
                    Ok(json) => json,
                    Err(_) => {
                        tracing::debug!(line = %line, "Skipping non-JSON stdout line");
                        continue;
                    }
                };
                for event in parse_cli_event(&json, &mut state)? {
                    if !event_tx.event(event).await {
                        tracing::debug!("Event receiver closed, stopping Claude CLI");
                        stop_child(&mut child, stderr_handle).await;
                        return Ok(());
                    }
                }
            }
        }
    }

    let status = child.wait().await?;

    // Wait for stderr reader to complete so the diagnostics are whole
    if let Err(e) = stderr_handle.await {
        tracing::warn!(error = %e, "stderr reader task failed to complete");
    }

    if status.success() {
        return Ok(());
    }

    match status.code() {
        Some(code) => Err(TaskError::AbnormalExit { code }),
        None => Err(TaskError::other(format!(
            "Claude CLI terminated by signal ({})",
            status
        ))),
    }
}

/// Kill the CLI and reap it so no zombie outlives the task
async fn stop_child(child: &mut Child, stderr_handle: JoinHandle<()>) {
    if let Err(e) = child.start_kill() {
        tracing::warn!(error = %e, "Failed to kill Claude CLI");
    }
    if let Err(e) = child.wait().await {
        tracing::warn!(error = %e, "Failed to reap Claude CLI");
    }
    stderr_handle.abort();
}

/// Running state carried across stream-json lines
#[derive(Debug, Default)]
pub struct ParseState {
    accumulated_text: String,
    session_announced: bool,
}

/// Convert one stream-json line into zero or more events
pub fn parse_cli_event(json: &Value, state: &mut ParseState) -> Result<Vec<AgentEvent>, TaskError> {
    let Some(event_type) = json.get("type").and_then(|t| t.as_str()) else {
        return Ok(Vec::new());
    };

    let mut events = Vec::new();

    match event_type {
        "system" => {
            // Capture session_id from init event
            if json.get("subtype").and_then(|s| s.as_str()) == Some("init") {
                if let Some(session_id) = json.get("session_id").and_then(|s| s.as_str()) {
                    state.session_announced = true;
                    events.push(AgentEvent::SessionStarted {
                        session_id: session_id.to_string(),
                    });
                }
            }
        }
        "assistant" => {
            for item in message_content(json) {
                match item.get("type").and_then(|t| t.as_str()) {
                    Some("text") => {
                        if let Some(text) = item.get("text").and_then(|t| t.as_str()) {
                            if !text.is_empty() {
                                push_text(&mut state.accumulated_text, text);
                                events.push(AgentEvent::Text(text.to_string()));
                            }
                        }
                    }
                    Some("thinking") => {
                        if let Some(thinking) = item.get("thinking").and_then(|t| t.as_str()) {
                            events.push(AgentEvent::Thinking(thinking.to_string()));
                        }
                    }
                    Some("tool_use") => {
                        let name = string_field(item, "name");
                        let id = string_field(item, "id");
                        let input = item.get("input").cloned().unwrap_or(Value::Null);

                        tracing::info!(tool = %name, id = %id, "Tool use detected");
                        events.push(AgentEvent::ToolStart { id, name, input });
                    }
                    _ => {}
                }
            }
        }
        "user" => {
            // Tool results come back wrapped in a user turn
            for item in message_content(json) {
                if item.get("type").and_then(|t| t.as_str()) == Some("tool_result") {
                    let is_error = item
                        .get("is_error")
                        .and_then(|v| v.as_bool())
                        .unwrap_or(false);
                    events.push(AgentEvent::ToolResult {
                        id: string_field(item, "tool_use_id"),
                        output: item.get("content").cloned().unwrap_or(Value::Null),
                        success: !is_error,
                    });
                }
            }
        }
        "result" => {
            let is_error = json
                .get("is_error")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);

            if is_error {
                let message = json
                    .get("error")
                    .or_else(|| json.get("result"))
                    .and_then(|e| e.as_str())
                    .unwrap_or("Unknown error")
                    .to_string();
                let subtype = json
                    .get("subtype")
                    .and_then(|s| s.as_str())
                    .unwrap_or("unknown");
                return Err(TaskError::other(format!(
                    "Claude reported an error (subtype: {}): {}",
                    subtype, message
                )));
            }

            if !state.session_announced {
                if let Some(session_id) = json.get("session_id").and_then(|s| s.as_str()) {
                    state.session_announced = true;
                    events.push(AgentEvent::SessionStarted {
                        session_id: session_id.to_string(),
                    });
                }
            }

            // Use accumulated text from assistant messages, falling back to the result field
            let text = if !state.accumulated_text.is_empty() {
                std::mem::take(&mut state.accumulated_text)
            } else {
                json.get("result")
                    .and_then(|r| r.as_str())
                    .unwrap_or("")
                    .to_string()
            };

            let cost_usd = json.get("total_cost_usd").and_then(|v| v.as_f64());
            let duration_ms = json.get("duration_ms").and_then(|v| v.as_u64());

            tracing::debug!(result_len = text.len(), ?cost_usd, ?duration_ms, "Result received");

            events.push(AgentEvent::Result {
                text,
                cost_usd,
                duration_ms,
            });
        }
        _ => {}
    }

    Ok(events)
}

fn message_content(json: &Value) -> impl Iterator<Item = &Value> {
    json.get("message")
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_array())
        .into_iter()
        .flatten()
}

fn string_field(item: &Value, key: &str) -> String {
    item.get(key)
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string()
}

/// Join text chunks, adding a space only where two words would otherwise run together
fn push_text(accumulated: &mut String, text: &str) {
    if !accumulated.is_empty() {
        let ends_with_ws = accumulated.ends_with(|c: char| c.is_whitespace());
        let starts_with_ws_or_punct =
            text.starts_with(|c: char| c.is_whitespace() || c.is_ascii_punctuation());
        if !ends_with_ws && !starts_with_ws_or_punct {
            accumulated.push(' ');
        }
    }
    accumulated.push_str(text);
}

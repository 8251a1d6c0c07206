// ABOUTME: Process-level tests for the direct CLI backend using fake claude scripts.
// ABOUTME: Verifies event parsing, exit-code mapping, stderr capture and cancellation.

#![cfg(unix)]

use futures::StreamExt;
use relay_agent::backends::direct_cli::{DirectCliBackend, DirectCliConfig};
use relay_agent::{AgentEvent, TaskClient, TaskError, TaskItem, TaskOptions, TaskRequest};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn fake_claude(dir: &Path, body: &str) -> String {
    let path = dir.join("fake-claude");
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.to_string_lossy().to_string()
}

fn backend(binary: String) -> DirectCliBackend {
    DirectCliBackend::new(DirectCliConfig {
        binary,
        ..Default::default()
    })
    .unwrap()
}

fn request(dir: &Path, cancel: &CancellationToken) -> TaskRequest {
    TaskRequest {
        working_dir: dir.to_path_buf(),
        prompt: "hello".to_string(),
        cancel: cancel.clone(),
        options: TaskOptions::default(),
    }
}

#[test]
fn test_direct_cli_config_deserializes() {
    let json = serde_json::json!({
        "binary": "claude",
        "sdk_url": "http://localhost:8080",
    });
    let config: DirectCliConfig = serde_json::from_value(json).unwrap();
    assert_eq!(config.binary, "claude");
    assert_eq!(config.sdk_url, Some("http://localhost:8080".to_string()));
    assert!(config.skip_permissions);
}

#[test]
fn test_direct_cli_config_minimal() {
    let config: DirectCliConfig = serde_json::from_value(serde_json::json!({})).unwrap();
    assert_eq!(config.binary, "claude");
    assert!(config.sdk_url.is_none());
    assert!(config.extra_args.is_empty());
}

#[tokio::test]
async fn test_direct_cli_streams_events_from_stdout() {
    let dir = TempDir::new().unwrap();
    let binary = fake_claude(
        dir.path(),
        r#"echo '{"type":"system","subtype":"init","session_id":"sess-42"}'
echo 'not json at all'
echo '{"type":"assistant","message":{"content":[{"type":"text","text":"hi"}]}}'
echo '{"type":"result","subtype":"success","total_cost_usd":0.01,"duration_ms":5}'"#,
    );

    let cancel = CancellationToken::new();
    let run = backend(binary).start(request(dir.path(), &cancel));
    let items: Vec<TaskItem> = run.events.collect().await;

    assert_eq!(
        items,
        vec![
            Ok(AgentEvent::SessionStarted {
                session_id: "sess-42".to_string()
            }),
            Ok(AgentEvent::Text("hi".to_string())),
            Ok(AgentEvent::Result {
                text: "hi".to_string(),
                cost_usd: Some(0.01),
                duration_ms: Some(5),
            }),
        ]
    );
}

#[tokio::test]
async fn test_direct_cli_nonzero_exit_reports_code_and_stderr() {
    let dir = TempDir::new().unwrap();
    let binary = fake_claude(dir.path(), "echo 'fatal: session corrupt' >&2\nexit 1");

    let cancel = CancellationToken::new();
    let run = backend(binary).start(request(dir.path(), &cancel));
    let items: Vec<TaskItem> = run.events.collect().await;

    assert_eq!(items, vec![Err(TaskError::AbnormalExit { code: 1 })]);
    assert_eq!(run.diagnostics.excerpt(), "fatal: session corrupt");
}

#[tokio::test]
async fn test_direct_cli_cancel_kills_process() {
    let dir = TempDir::new().unwrap();
    let binary = fake_claude(dir.path(), "sleep 30");

    let cancel = CancellationToken::new();
    let mut run = backend(binary).start(request(dir.path(), &cancel));

    tokio::time::sleep(Duration::from_millis(100)).await;
    cancel.cancel();

    let item = tokio::time::timeout(Duration::from_secs(5), run.events.next())
        .await
        .expect("cancelled task should settle promptly");
    assert_eq!(item, Some(Err(TaskError::Aborted)));
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_direct_cli_reaps_process_when_receiver_drops() {
    let dir = TempDir::new().unwrap();
    let pid_file = dir.path().join("pid");
    let binary = fake_claude(
        dir.path(),
        &format!(
            r#"echo $$ > {}
while true; do
  echo '{{"type":"assistant","message":{{"content":[{{"type":"text","text":"tick"}}]}}}}'
  sleep 0.1
done"#,
            pid_file.display()
        ),
    );

    let cancel = CancellationToken::new();
    let mut run = backend(binary).start(request(dir.path(), &cancel));
    let first = tokio::time::timeout(Duration::from_secs(5), run.events.next())
        .await
        .expect("first event");
    assert_eq!(first, Some(Ok(AgentEvent::Text("tick".to_string()))));
    drop(run);

    let pid = std::fs::read_to_string(&pid_file).unwrap().trim().to_string();
    let proc_entry = Path::new("/proc").join(&pid);
    for _ in 0..50 {
        if !proc_entry.exists() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("Claude CLI process {} was left running or unreaped", pid);
}

#[tokio::test]
async fn test_direct_cli_missing_binary_fails_stream() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("does-not-exist").to_string_lossy().to_string();

    let cancel = CancellationToken::new();
    let run = backend(missing).start(request(dir.path(), &cancel));
    let items: Vec<TaskItem> = run.events.collect().await;

    match &items[..] {
        [Err(TaskError::Other(message))] => assert!(message.contains("Failed to spawn")),
        other => panic!("Unexpected items: {:?}", other),
    }
}

// ABOUTME: Tests for the scripted mock backend.
// ABOUTME: Covers event playback, failures, cancellation and request recording.

use futures::StreamExt;
use relay_agent::backends::mock::{MockBackend, Step};
use relay_agent::{AgentEvent, TaskClient, TaskError, TaskItem, TaskOptions, TaskRequest};
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn request(prompt: &str, cancel: &CancellationToken) -> TaskRequest {
    TaskRequest {
        working_dir: PathBuf::from("/tmp/relay-test"),
        prompt: prompt.to_string(),
        cancel: cancel.clone(),
        options: TaskOptions::default(),
    }
}

async fn collect(client: &MockBackend, prompt: &str) -> Vec<TaskItem> {
    let cancel = CancellationToken::new();
    let run = client.start(request(prompt, &cancel));
    run.events.collect().await
}

#[tokio::test]
async fn test_mock_backend_returns_configured_text_response() {
    let mock = MockBackend::new().on_prompt("hello").respond_text("Hi there!");

    let items = collect(&mock, "hello").await;

    assert_eq!(items.len(), 2);
    assert_eq!(items[0], Ok(AgentEvent::Text("Hi there!".to_string())));
    match &items[1] {
        Ok(AgentEvent::Result { text, .. }) => assert_eq!(text, "Hi there!"),
        other => panic!("Expected Result event, got {:?}", other),
    }
}

#[tokio::test]
async fn test_mock_backend_tool_response() {
    let mock = MockBackend::new().on_prompt("read file").respond_with(vec![
        AgentEvent::ToolStart {
            id: "t1".to_string(),
            name: "Read".to_string(),
            input: json!({"path": "/tmp/foo"}),
        },
        AgentEvent::ToolResult {
            id: "t1".to_string(),
            output: json!({"content": "file contents"}),
            success: true,
        },
        AgentEvent::result_text("Read the file"),
    ]);

    let items = collect(&mock, "please read file").await;

    assert_eq!(items.len(), 3);
    assert!(matches!(&items[0], Ok(AgentEvent::ToolStart { name, .. }) if name == "Read"));
    assert!(matches!(&items[1], Ok(AgentEvent::ToolResult { success: true, .. })));
    assert!(matches!(&items[2], Ok(AgentEvent::Result { .. })));
}

#[tokio::test]
async fn test_mock_backend_error_response_keeps_diagnostics() {
    let mock = MockBackend::new().on_prompt("fail").respond_steps(vec![
        Step::Stderr("Error: something broke".to_string()),
        Step::Fail(TaskError::AbnormalExit { code: 1 }),
    ]);

    let cancel = CancellationToken::new();
    let run = mock.start(request("fail", &cancel));
    let items: Vec<TaskItem> = run.events.collect().await;

    assert_eq!(items, vec![Err(TaskError::AbnormalExit { code: 1 })]);
    assert_eq!(run.diagnostics.excerpt(), "Error: something broke");
}

#[tokio::test]
async fn test_mock_backend_default_response_when_no_expectation() {
    let mock = MockBackend::new();

    let items = collect(&mock, "anything").await;

    match &items[..] {
        [Ok(AgentEvent::Result { text, .. })] => assert!(text.contains("no expectation")),
        other => panic!("Unexpected items: {:?}", other),
    }
}

#[tokio::test]
async fn test_mock_backend_prefers_fifo_then_searches() {
    let mock = MockBackend::new()
        .on_prompt("first")
        .respond_text("one")
        .on_prompt("second")
        .respond_text("two");

    let items = collect(&mock, "second").await;
    assert_eq!(items[0], Ok(AgentEvent::Text("two".to_string())));
    assert_eq!(mock.pending_expectations(), 1);

    let items = collect(&mock, "first").await;
    assert_eq!(items[0], Ok(AgentEvent::Text("one".to_string())));
    assert_eq!(mock.pending_expectations(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_mock_backend_hang_ends_with_aborted_on_cancel() {
    let mock = MockBackend::new().on_prompt("stuck").respond_steps(vec![
        Step::Emit(AgentEvent::Text("started".to_string())),
        Step::Hang,
    ]);

    let cancel = CancellationToken::new();
    let mut run = mock.start(request("stuck", &cancel));

    assert_eq!(
        run.events.next().await,
        Some(Ok(AgentEvent::Text("started".to_string())))
    );

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        canceller.cancel();
    });

    assert_eq!(run.events.next().await, Some(Err(TaskError::Aborted)));
    assert_eq!(run.events.next().await, None);
}

#[tokio::test(start_paused = true)]
async fn test_mock_backend_wait_is_interrupted_by_cancel() {
    let mock = MockBackend::new().on_prompt("slow").respond_steps(vec![
        Step::Wait(Duration::from_secs(600)),
        Step::Emit(AgentEvent::result_text("late")),
    ]);

    let cancel = CancellationToken::new();
    let mut run = mock.start(request("slow", &cancel));
    cancel.cancel();

    assert_eq!(run.events.next().await, Some(Err(TaskError::Aborted)));
}

#[tokio::test]
async fn test_mock_backend_records_requests() {
    let mock = MockBackend::new();
    let cancel = CancellationToken::new();

    let mut req = request("with options", &cancel);
    req.options = TaskOptions {
        resume_session_id: Some("sess-1".to_string()),
        continue_conversation: false,
        model: Some("haiku".to_string()),
    };
    let run = mock.start(req);
    let _: Vec<TaskItem> = run.events.collect().await;

    let recorded = mock.requests();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].prompt, "with options");
    assert_eq!(recorded[0].options.resume_session_id.as_deref(), Some("sess-1"));
    assert_eq!(recorded[0].options.model.as_deref(), Some("haiku"));
    assert_eq!(mock.prompts(), vec!["with options".to_string()]);
}

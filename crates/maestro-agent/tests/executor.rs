//! Streaming executor behaviour against scripted backends.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use maestro_agent::backends::{ChatBackend, ChatRequest, ChatStream};
use maestro_agent::stream::{ChatUpdate, ToolCallFragment};
use maestro_agent::tool::{Tool, ToolDescriptor};
use maestro_agent::StreamingExecutor;
use maestro_core::{
    progress_bus, MaestroError, MaestroResult, Message, ProgressEvent, ProgressKind, ProgressSender,
    ToolCall, ToolResult,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

enum Step {
    Send(ChatUpdate),
    Sleep(u64),
    Fail(&'static str),
}

/// Plays one script per model call, in order.
struct ScriptedBackend {
    scripts: Mutex<VecDeque<Vec<Step>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedBackend {
    fn new(scripts: Vec<Vec<Step>>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn stream(&self, request: &ChatRequest) -> MaestroResult<ChatStream> {
        self.requests.lock().unwrap().push(request.clone());
        let script = self.scripts.lock().unwrap().pop_front().unwrap_or_default();
        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            for step in script {
                match step {
                    Step::Send(update) => {
                        let _ = tx.send(Ok(update)).await;
                    }
                    Step::Sleep(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
                    Step::Fail(msg) => {
                        let _ = tx.send(Err(MaestroError::Http(msg.to_string()))).await;
                        return;
                    }
                }
            }
        });
        Ok(rx)
    }
}

struct EchoTool {
    descriptor: ToolDescriptor,
}

impl EchoTool {
    fn named(name: &str) -> Arc<Self> {
        Arc::new(Self {
            descriptor: ToolDescriptor {
                name: name.to_string(),
                description: "Echoes its arguments".to_string(),
                parameters_schema: serde_json::json!({"type": "object"}),
            },
        })
    }
}

#[async_trait]
impl Tool for EchoTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, call: ToolCall) -> MaestroResult<ToolResult> {
        tokio::time::sleep(Duration::from_millis(5)).await;
        Ok(ToolResult::success(call.id, call.arguments.to_string()))
    }
}

/// Pushes a nested event on the bus, then takes a while to answer.
struct NestedTool {
    descriptor: ToolDescriptor,
    events: ProgressSender,
}

#[async_trait]
impl Tool for NestedTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, call: ToolCall) -> MaestroResult<ToolResult> {
        self.events
            .emit(ProgressEvent::thinking("Researcher", "Working on request..."));
        tokio::time::sleep(Duration::from_millis(150)).await;
        Ok(ToolResult::success(call.id, "nested answer"))
    }
}

fn count(events: &[ProgressEvent], kind: ProgressKind) -> usize {
    events.iter().filter(|e| e.kind == kind).count()
}

#[tokio::test]
async fn test_partial_fragments_report_one_tool_call() {
    let backend = ScriptedBackend::new(vec![
        vec![
            Step::Send(ChatUpdate::ToolCall(ToolCallFragment::partial("call_1", "", "{\"query\":"))),
            Step::Send(ChatUpdate::ToolCall(ToolCallFragment::partial("", "search_docs", "\"rust\"}"))),
            Step::Send(ChatUpdate::ToolCall(ToolCallFragment::complete(
                "call_1",
                "search_docs",
                r#"{"query":"rust"}"#,
            ))),
        ],
        vec![Step::Send(ChatUpdate::text("Found it."))],
    ]);
    let executor = StreamingExecutor::new(backend.clone(), "Researcher")
        .with_tools(vec![EchoTool::named("search_docs")]);

    let run = executor
        .run(Some("be brief"), &[Message::user("find rust")], None)
        .await
        .unwrap();

    assert_eq!(count(&run.events, ProgressKind::ToolCall), 1);
    assert_eq!(count(&run.events, ProgressKind::ToolResult), 1);
    let call = run.events.iter().find(|e| e.kind == ProgressKind::ToolCall).unwrap();
    assert_eq!(call.content, "Calling search_docs");
    assert_eq!(call.tool_args, Some(serde_json::json!({"query": "rust"})));
    assert_eq!(
        call.friendly_message.as_deref(),
        Some("Searching for information: \"rust\"")
    );
    let result = run.events.iter().find(|e| e.kind == ProgressKind::ToolResult).unwrap();
    assert_eq!(result.tool_name.as_deref(), Some("call_1"));
    assert!(result.duration_ms.unwrap() >= 0.0);
    assert_eq!(run.text, "Found it.");

    // The second model call saw the tool result backfilled.
    let requests = backend.requests.lock().unwrap();
    assert_eq!(requests.len(), 2);
    assert!(requests[1].turns.iter().any(|m| m.content.contains("tool_result")));
    assert_eq!(requests[0].tools.len(), 1);
}

#[tokio::test]
async fn test_duplicate_results_reported_once() {
    let backend = ScriptedBackend::new(vec![vec![
        Step::Send(ChatUpdate::ToolCall(ToolCallFragment::partial("c9", "lookup", ""))),
        Step::Send(ChatUpdate::ToolResult(maestro_agent::stream::ToolResultFragment {
            call_id: "c9".into(),
            content: "row".into(),
            is_error: false,
        })),
        Step::Send(ChatUpdate::ToolResult(maestro_agent::stream::ToolResultFragment {
            call_id: "c9".into(),
            content: "row".into(),
            is_error: false,
        })),
        Step::Send(ChatUpdate::text("ok")),
    ]]);
    let run = StreamingExecutor::new(backend, "A")
        .run(None, &[Message::user("q")], None)
        .await
        .unwrap();
    assert_eq!(count(&run.events, ProgressKind::ToolCall), 1);
    assert_eq!(count(&run.events, ProgressKind::ToolResult), 1);
}

#[tokio::test]
async fn test_tokens_estimated_without_usage() {
    let backend = ScriptedBackend::new(vec![vec![Step::Send(ChatUpdate::text("hello"))]]);
    // Input "abcdefghi" is 9 characters, output "hello" is 5.
    let run = StreamingExecutor::new(backend, "A")
        .run(Some("instructions are not counted"), &[Message::user("abcdefghi")], None)
        .await
        .unwrap();
    assert!(run.tokens_estimated);
    assert_eq!(run.usage.input, 3);
    assert_eq!(run.usage.output, 2);
    assert_eq!(run.tokens_used(), 5);
}

#[tokio::test]
async fn test_reported_usage_is_used() {
    let backend = ScriptedBackend::new(vec![vec![
        Step::Send(ChatUpdate::text("hi")),
        Step::Send(ChatUpdate::Usage {
            usage: serde_json::json!({"prompt_tokens": 40, "completion_tokens": 2}),
        }),
    ]]);
    let run = StreamingExecutor::new(backend, "A")
        .run(None, &[Message::user("x")], None)
        .await
        .unwrap();
    assert!(!run.tokens_estimated);
    assert_eq!(run.tokens_used(), 42);
    let thinking = run.events.iter().find(|e| e.kind == ProgressKind::Thinking).unwrap();
    assert_eq!(thinking.content, "LLM call: 40 input, 2 output tokens");
}

#[tokio::test]
async fn test_nested_bus_events_surface_before_tool_result() {
    let (sender, mut receiver) = progress_bus();
    let tool = Arc::new(NestedTool {
        descriptor: ToolDescriptor {
            name: "researcher".into(),
            description: "Research specialist".into(),
            parameters_schema: serde_json::json!({"type": "object"}),
        },
        events: sender,
    });
    let backend = ScriptedBackend::new(vec![
        vec![Step::Send(ChatUpdate::ToolCall(ToolCallFragment::complete(
            "d1",
            "researcher",
            r#"{"request":"look into it"}"#,
        )))],
        vec![Step::Send(ChatUpdate::text("summary"))],
    ]);
    let executor = StreamingExecutor::new(backend, "Orchestrator")
        .with_tools(vec![tool])
        .with_delegation_targets(["Researcher"])
        .with_poll_interval(Duration::from_millis(10));

    let run = executor
        .run(None, &[Message::user("go")], Some(&mut receiver))
        .await
        .unwrap();

    let kinds: Vec<ProgressKind> = run.events.iter().map(|e| e.kind).collect();
    let delegation = kinds.iter().position(|k| *k == ProgressKind::Delegation).unwrap();
    let nested = run
        .events
        .iter()
        .position(|e| e.agent_name == "Researcher")
        .unwrap();
    let result = kinds.iter().position(|k| *k == ProgressKind::ToolResult).unwrap();
    assert!(delegation < nested && nested < result, "order was {kinds:?}");
    assert_eq!(run.events[delegation].content, "Delegating to researcher");
    assert_eq!(run.text, "summary");
}

#[tokio::test]
async fn test_bus_events_arrive_while_model_is_slow() {
    let (sender, mut receiver) = progress_bus();
    let backend = ScriptedBackend::new(vec![vec![
        Step::Sleep(120),
        Step::Send(ChatUpdate::text("late")),
    ]]);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        sender.emit(ProgressEvent::content("Specialist", "early"));
    });

    let run = StreamingExecutor::new(backend, "A")
        .with_poll_interval(Duration::from_millis(10))
        .run(None, &[Message::user("x")], Some(&mut receiver))
        .await
        .unwrap();
    assert_eq!(run.events.len(), 1);
    assert_eq!(run.events[0].content, "early");
    assert_eq!(run.text, "late");
}

#[tokio::test]
async fn test_stream_failure_is_returned() {
    let backend = ScriptedBackend::new(vec![vec![
        Step::Send(ChatUpdate::text("partial")),
        Step::Fail("Stream read error: reset"),
    ]]);
    let err = StreamingExecutor::new(backend, "A")
        .run(None, &[Message::user("x")], None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("reset"));
}

#[tokio::test]
async fn test_unknown_tool_feeds_error_back() {
    let backend = ScriptedBackend::new(vec![
        vec![Step::Send(ChatUpdate::ToolCall(ToolCallFragment::complete("u1", "nope", "{}")))],
        vec![Step::Send(ChatUpdate::text("recovered"))],
    ]);
    let run = StreamingExecutor::new(backend.clone(), "A")
        .run(None, &[Message::user("x")], None)
        .await
        .unwrap();
    assert_eq!(run.text, "recovered");
    let requests = backend.requests.lock().unwrap();
    assert!(requests[1].turns.iter().any(|m| m.content.contains("Unknown tool: nope")));
}

#[tokio::test]
async fn test_tool_loop_bounded_by_max_turns() {
    let scripts = (0..5)
        .map(|i| {
            vec![Step::Send(ChatUpdate::ToolCall(ToolCallFragment::complete(
                format!("loop{i}"),
                "echo",
                "{}",
            )))]
        })
        .collect();
    let backend = ScriptedBackend::new(scripts);
    let run = StreamingExecutor::new(backend.clone(), "A")
        .with_tools(vec![EchoTool::named("echo")])
        .with_max_turns(2)
        .run(None, &[Message::user("x")], None)
        .await
        .unwrap();
    assert_eq!(backend.requests.lock().unwrap().len(), 2);
    assert_eq!(count(&run.events, ProgressKind::ToolCall), 2);
}

//! In-process tests of the A2A router.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use maestro_a2a::{
    A2aAgentHandler, A2aClient, A2aServer, A2aTransport, AuthConfig, LocalExecution,
};
use maestro_core::{AgentConfig, MaestroError, MaestroResult, ProgressEvent};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::util::ServiceExt;

struct FixedAgents {
    agents: Vec<AgentConfig>,
    seen_tokens: Mutex<Vec<Option<String>>>,
}

impl FixedAgents {
    fn new() -> Arc<Self> {
        let mut hidden = AgentConfig::new("hidden", "Hidden").with_description("Internal only");
        hidden.a2a_enabled = false;
        Arc::new(Self {
            agents: vec![
                AgentConfig::new("research", "Research Agent").with_description("Finds documents"),
                AgentConfig::new("broken", "Broken Agent"),
                hidden,
                AgentConfig::new("weather", "Weather").remote("https://other.example/a2a/weather"),
            ],
            seen_tokens: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl A2aAgentHandler for FixedAgents {
    async fn agents(&self) -> MaestroResult<Vec<AgentConfig>> {
        Ok(self.agents.clone())
    }

    async fn agent(&self, id: &str) -> MaestroResult<Option<AgentConfig>> {
        Ok(self.agents.iter().find(|a| a.id == id).cloned())
    }

    async fn execute(
        &self,
        agent: &AgentConfig,
        text: &str,
        auth_token: Option<&str>,
    ) -> MaestroResult<LocalExecution> {
        self.seen_tokens
            .lock()
            .unwrap()
            .push(auth_token.map(ToString::to_string));
        if agent.id == "broken" {
            return Err(MaestroError::Agent("model unavailable".into()));
        }
        Ok(LocalExecution {
            text: format!("{} answered: {text}", agent.name),
            events: vec![ProgressEvent::thinking(&agent.name, "LLM call: 10 input, 4 output tokens")
                .with_tokens(10, 4)
                .with_duration(12.345)],
            duration_ms: 321.0,
            tokens_input: 10,
            tokens_output: 4,
        })
    }
}

fn app(handler: Arc<FixedAgents>, keys: Vec<String>) -> Router {
    A2aServer::build(
        handler,
        Some("http://maestro.test/".to_string()),
        AuthConfig::new(keys),
    )
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

async fn post(app: &Router, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .uri(uri)
        .method("POST")
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let response = app
        .clone()
        .oneshot(builder.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

fn send(text: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": "req-1",
        "method": "message/send",
        "params": {"message": {"kind": "message", "role": "user", "parts": [{"kind": "text", "text": text}]}}
    })
}

#[tokio::test]
async fn test_health() {
    let (status, body) = get(&app(FixedAgents::new(), vec![]), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_directory_lists_local_enabled_agents() {
    let (status, body) = get(&app(FixedAgents::new(), vec![]), "/.well-known/agent.json").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);
    let names: Vec<&str> = body["agents"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Research Agent", "Broken Agent"]);
    assert_eq!(body["agents"][0]["url"], "http://maestro.test/a2a/research");
}

#[tokio::test]
async fn test_card_paths_and_statuses() {
    let app = app(FixedAgents::new(), vec!["k".into()]);
    for uri in [
        "/a2a/research",
        "/a2a/research/.well-known/agent.json",
        "/a2a/research/v1/card",
    ] {
        let (status, card) = get(&app, uri).await;
        assert_eq!(status, StatusCode::OK, "{uri}");
        assert_eq!(card["name"], "Research Agent");
        assert_eq!(card["version"], "1.0");
        assert_eq!(card["protocol_version"], "0.3.0");
        assert_eq!(card["capabilities"]["streaming"], true);
        assert_eq!(card["skills"][0]["id"], "research");
        assert_eq!(card["default_output_modes"], json!(["text"]));
    }
    assert_eq!(get(&app, "/a2a/missing").await.0, StatusCode::NOT_FOUND);
    assert_eq!(get(&app, "/a2a/weather").await.0, StatusCode::NOT_FOUND);
    assert_eq!(get(&app, "/a2a/hidden/v1/card").await.0, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_card_url_derived_from_host_header() {
    let app = A2aServer::build(FixedAgents::new(), None, AuthConfig::default());
    let response = app
        .oneshot(
            Request::builder()
                .uri("/a2a/research")
                .header("host", "agents.internal:9000")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let card: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(card["url"], "http://agents.internal:9000/a2a/research");
}

#[tokio::test]
async fn test_message_requires_bearer() {
    let app = app(FixedAgents::new(), vec![]);
    let (status, _) = post(&app, "/a2a/research", None, send("hi")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_message_rejects_unknown_key() {
    let app = app(FixedAgents::new(), vec!["good".into()]);
    let (status, _) = post(&app, "/a2a/research", Some("bad"), send("hi")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = post(&app, "/a2a/research", Some("good"), send("hi")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_message_send_returns_reply_with_metadata() {
    let handler = FixedAgents::new();
    let app = app(handler.clone(), vec![]);
    let (status, body) = post(&app, "/a2a/research", Some("user-token"), send("  what is new? ")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "req-1");
    let result = &body["result"];
    assert_eq!(result["kind"], "message");
    assert_eq!(result["role"], "agent");
    assert!(result["messageId"].as_str().is_some());
    assert_eq!(result["parts"][0]["text"], "Research Agent answered: what is new?");
    let meta = &result["metadata"];
    assert_eq!(meta["duration_ms"], 321.0);
    assert_eq!(meta["tokens_input"], 10);
    assert_eq!(meta["tokens_output"], 4);
    let event = &meta["chatter_events"][0];
    assert_eq!(event["type"], "thinking");
    assert_eq!(event["duration_ms"], 12.3);
    assert!(event.get("tool_name").is_none());

    assert_eq!(
        handler.seen_tokens.lock().unwrap().as_slice(),
        &[Some("user-token".to_string())]
    );
}

#[tokio::test]
async fn test_json_rpc_errors() {
    let app = app(FixedAgents::new(), vec![]);

    let (_, body) = post(&app, "/a2a/research", Some("t"), send("   ")).await;
    assert_eq!(body["error"]["code"], -32602);
    assert_eq!(body["error"]["message"], "Message must contain text");

    let mut unknown = send("hi");
    unknown["method"] = json!("tasks/get");
    let (_, body) = post(&app, "/a2a/research", Some("t"), unknown).await;
    assert_eq!(body["error"]["code"], -32601);

    let (_, body) = post(&app, "/a2a/broken", Some("t"), send("hi")).await;
    assert_eq!(body["error"]["code"], -32603);
    assert!(body["error"]["message"].as_str().unwrap().contains("model unavailable"));
}

#[tokio::test]
async fn test_message_to_remote_agent_is_not_found() {
    let app = app(FixedAgents::new(), vec![]);
    let (status, _) = post(&app, "/a2a/weather", Some("t"), send("hi")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_client_against_live_server() {
    let handler = FixedAgents::new();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let base = format!("http://{addr}");
    let router = A2aServer::build(handler, Some(base.clone()), AuthConfig::default());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    let client = A2aClient::new(Duration::from_secs(5)).unwrap();
    let outcome = client
        .call(&format!("{base}/a2a/research"), "ping", Some("tok"))
        .await;
    assert_eq!(outcome.error, None);
    assert_eq!(outcome.text, "Research Agent answered: ping");
    assert_eq!(outcome.duration_ms, 321.0);
    assert_eq!(outcome.events.len(), 1);
    assert_eq!(outcome.events[0].tokens_input, Some(10));

    let failed = client
        .call(&format!("{base}/a2a/broken"), "ping", Some("tok"))
        .await;
    assert!(failed.text.is_empty());
    assert!(failed.error.unwrap().contains("model unavailable"));

    let cards = client.discover(&base).await.unwrap();
    assert_eq!(cards.len(), 2);
    let card = client.discover(&format!("{base}/a2a/research")).await.unwrap();
    assert_eq!(card.len(), 1);
    assert_eq!(card[0].url, format!("{base}/a2a/research"));
}

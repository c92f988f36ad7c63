//! Scripted collaborators shared by the orchestrator integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use maestro_a2a::{A2aCallOutcome, A2aTransport};
use maestro_agent::{BackendFactory, ChatBackend, ChatRequest, ChatStream, ChatUpdate};
use maestro_core::{AgentConfig, MaestroError, MaestroResult, ProgressEvent};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub enum Reply {
    Text(String),
    /// Answer with the instructions the call was given.
    EchoInstructions,
}

pub fn text(s: &str) -> Reply {
    Reply::Text(s.to_string())
}

/// Orchestrator model: one reply per call, in order, each with usage 10/5.
pub struct ScriptedChat {
    replies: Mutex<VecDeque<Reply>>,
    pub requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedChat {
    pub fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn instructions(&self, call: usize) -> String {
        self.requests.lock().unwrap()[call]
            .instructions
            .clone()
            .unwrap_or_default()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatBackend for ScriptedChat {
    async fn stream(&self, request: &ChatRequest) -> MaestroResult<ChatStream> {
        self.requests.lock().unwrap().push(request.clone());
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| text("```json\n{\"continue\": false}\n```"));
        let body = match reply {
            Reply::Text(body) => body,
            Reply::EchoInstructions => request.instructions.clone().unwrap_or_default(),
        };
        let (tx, rx) = mpsc::channel(8);
        tx.send(Ok(ChatUpdate::text(body))).await.unwrap();
        tx.send(Ok(ChatUpdate::Usage {
            usage: serde_json::json!({"prompt_tokens": 10, "completion_tokens": 5}),
        }))
        .await
        .unwrap();
        Ok(rx)
    }
}

/// A model endpoint that cannot be reached.
pub struct DownChat;

#[async_trait]
impl ChatBackend for DownChat {
    async fn stream(&self, _request: &ChatRequest) -> MaestroResult<ChatStream> {
        Err(MaestroError::Http("connection refused".into()))
    }
}

pub struct FixedBackends(pub Arc<dyn ChatBackend>);

impl BackendFactory for FixedBackends {
    fn backend_for(&self, _agent: &AgentConfig) -> MaestroResult<Arc<dyn ChatBackend>> {
        Ok(self.0.clone())
    }
}

#[derive(Clone, Default)]
pub struct Canned {
    pub text: String,
    pub delay_ms: u64,
    pub error: Option<String>,
    pub events: Vec<ProgressEvent>,
}

pub fn answer(text: &str) -> Canned {
    Canned {
        text: text.to_string(),
        ..Canned::default()
    }
}

pub fn slow(text: &str, delay_ms: u64) -> Canned {
    Canned {
        text: text.to_string(),
        delay_ms,
        ..Canned::default()
    }
}

pub fn failure(error: &str) -> Canned {
    Canned {
        error: Some(error.to_string()),
        ..Canned::default()
    }
}

/// A2A transport keyed by the last path segment of the URL (the agent id).
#[derive(Default)]
pub struct MockTransport {
    replies: HashMap<String, Canned>,
    /// `(agent id, message)` in the order calls started.
    pub calls: Mutex<Vec<(String, String)>>,
}

impl MockTransport {
    pub fn new(replies: &[(&str, Canned)]) -> Arc<Self> {
        Arc::new(Self {
            replies: replies
                .iter()
                .map(|(id, canned)| (id.to_string(), canned.clone()))
                .collect(),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn called_ids(&self) -> Vec<String> {
        self.calls().into_iter().map(|(id, _)| id).collect()
    }
}

#[async_trait]
impl A2aTransport for MockTransport {
    async fn call(&self, url: &str, text: &str, _auth_token: Option<&str>) -> A2aCallOutcome {
        let id = url.rsplit('/').next().unwrap_or_default().to_string();
        self.calls.lock().unwrap().push((id.clone(), text.to_string()));
        let canned = self.replies.get(&id).cloned().unwrap_or_default();
        if canned.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(canned.delay_ms)).await;
        }
        A2aCallOutcome {
            text: canned.text,
            events: canned.events,
            duration_ms: canned.delay_ms as f64,
            tokens_input: Some(2),
            tokens_output: Some(3),
            error: canned.error,
        }
    }
}

pub fn orchestrator() -> AgentConfig {
    AgentConfig::new("boss", "Orchestrator")
        .orchestrator()
        .with_model("gpt-4o")
}

pub fn specialist(id: &str, name: &str, description: &str) -> AgentConfig {
    AgentConfig::new(id, name)
        .with_description(description)
        .with_model("gpt-4o-mini")
}

pub fn delegate(ids: &[&str]) -> Reply {
    let list = ids
        .iter()
        .map(|id| format!("\"{id}\""))
        .collect::<Vec<_>>()
        .join(", ");
    Reply::Text(format!(
        "```json\n{{\"action\": \"delegate\", \"specialists\": [{list}], \"reasoning\": \"needs experts\"}}\n```"
    ))
}

//! A2A server: exposes local agents to other installations.

use crate::middleware::{bearer_auth, bearer_token, AuthConfig};
use crate::protocol::{
    codes, A2aMessage, AgentCard, AgentDirectory, JsonRpcRequest, JsonRpcResponse,
    MessageSendParams, ResultMetadata, METHOD_MESSAGE_SEND,
};
use async_trait::async_trait;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    middleware as axum_mw,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use maestro_core::{preview, AgentConfig, MaestroResult, ProgressEvent};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Output of one local agent execution.
#[derive(Debug, Clone, Default)]
pub struct LocalExecution {
    /// Final reply text.
    pub text: String,
    /// Progress events emitted during the run.
    pub events: Vec<ProgressEvent>,
    /// Wall-clock execution time.
    pub duration_ms: f64,
    /// Prompt tokens spent.
    pub tokens_input: u64,
    /// Completion tokens spent.
    pub tokens_output: u64,
}

/// Agent lookup and execution behind the server.
#[async_trait]
pub trait A2aAgentHandler: Send + Sync {
    /// Every configured agent.
    async fn agents(&self) -> MaestroResult<Vec<AgentConfig>>;

    /// One agent by id.
    async fn agent(&self, id: &str) -> MaestroResult<Option<AgentConfig>>;

    /// Run `agent` on a single user message.
    async fn execute(
        &self,
        agent: &AgentConfig,
        text: &str,
        auth_token: Option<&str>,
    ) -> MaestroResult<LocalExecution>;
}

struct ServerState {
    handler: Arc<dyn A2aAgentHandler>,
    base_url: Option<String>,
}

impl ServerState {
    /// Public URL prefix: configured value, else derived from forwarding or
    /// host headers.
    fn base_url(&self, headers: &HeaderMap) -> String {
        if let Some(url) = &self.base_url {
            return url.trim_end_matches('/').to_string();
        }
        let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
        let scheme = header("x-forwarded-proto").unwrap_or("http");
        let host = header("x-forwarded-host")
            .or_else(|| header("host"))
            .unwrap_or("localhost");
        format!("{scheme}://{host}")
    }
}

/// Builds the A2A router.
pub struct A2aServer;

impl A2aServer {
    /// `base_url` is the public prefix used in agent cards; `None` derives it
    /// from each request.
    pub fn build(
        handler: Arc<dyn A2aAgentHandler>,
        base_url: Option<String>,
        auth: AuthConfig,
    ) -> Router {
        let state = Arc::new(ServerState { handler, base_url });

        Router::new()
            .route("/health", get(health_handler))
            .route("/.well-known/agent.json", get(directory_handler))
            .route("/a2a/{agent_id}", get(card_handler).post(message_handler))
            .route("/a2a/{agent_id}/.well-known/agent.json", get(card_handler))
            .route("/a2a/{agent_id}/v1/card", get(card_handler))
            .with_state(state)
            .layer(axum_mw::from_fn_with_state(Arc::new(auth), bearer_auth))
    }
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok", "service": "maestro"}))
}

fn detail(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({"detail": message}))).into_response()
}

async fn directory_handler(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
) -> Response {
    let agents = match state.handler.agents().await {
        Ok(agents) => agents,
        Err(e) => {
            error!(error = %e, "Failed to list agents");
            return detail(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string());
        }
    };
    let base_url = state.base_url(&headers);
    let cards: Vec<AgentCard> = agents
        .iter()
        .filter(|a| a.is_local() && a.a2a_enabled)
        .map(|a| AgentCard::for_agent(a, &base_url))
        .collect();
    info!(count = cards.len(), "A2A discovery");
    Json(AgentDirectory {
        count: cards.len(),
        agents: cards,
    })
    .into_response()
}

/// Resolve a local agent, mapping absence to the HTTP status to return.
async fn local_agent(state: &ServerState, agent_id: &str) -> Result<AgentConfig, Response> {
    match state.handler.agent(agent_id).await {
        Ok(Some(agent)) if agent.is_local() => Ok(agent),
        Ok(Some(_)) => Err(detail(StatusCode::NOT_FOUND, "Agent not available via A2A")),
        Ok(None) => Err(detail(StatusCode::NOT_FOUND, "Agent not found")),
        Err(e) => {
            error!(agent_id = %agent_id, error = %e, "Agent lookup failed");
            Err(detail(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))
        }
    }
}

async fn card_handler(
    State(state): State<Arc<ServerState>>,
    Path(agent_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let agent = match local_agent(&state, &agent_id).await {
        Ok(agent) => agent,
        Err(resp) => return resp,
    };
    if !agent.a2a_enabled {
        return detail(StatusCode::FORBIDDEN, "Agent does not have A2A enabled");
    }
    Json(AgentCard::for_agent(&agent, &state.base_url(&headers))).into_response()
}

async fn message_handler(
    State(state): State<Arc<ServerState>>,
    Path(agent_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<JsonRpcRequest>,
) -> Response {
    let agent = match local_agent(&state, &agent_id).await {
        Ok(agent) => agent,
        Err(resp) => return resp,
    };
    let id = request.id.clone();
    info!(agent_id = %agent_id, method = %request.method, "A2A message");

    if request.method != METHOD_MESSAGE_SEND {
        return Json(JsonRpcResponse::failure(
            id,
            codes::METHOD_NOT_FOUND,
            format!("Method not found: {}", request.method),
        ))
        .into_response();
    }

    let text = serde_json::from_value::<MessageSendParams>(request.params)
        .map(|p| p.message.input_text())
        .unwrap_or_default();
    if text.is_empty() {
        return Json(JsonRpcResponse::failure(
            id,
            codes::INVALID_PARAMS,
            "Message must contain text",
        ))
        .into_response();
    }

    let token = bearer_token(&headers);
    info!(
        agent_id = %agent_id,
        has_token = token.is_some(),
        message = %preview(&text, 100),
        "A2A executing agent"
    );
    match state.handler.execute(&agent, &text, token.as_deref()).await {
        Ok(run) => {
            info!(
                agent_id = %agent_id,
                chars = run.text.len(),
                events = run.events.len(),
                "A2A agent completed"
            );
            let metadata = ResultMetadata {
                chatter_events: run
                    .events
                    .iter()
                    .filter_map(|e| serde_json::to_value(e).ok())
                    .collect(),
                duration_ms: Some(run.duration_ms),
                tokens_input: Some(run.tokens_input),
                tokens_output: Some(run.tokens_output),
            };
            let reply = A2aMessage::agent_reply(run.text, metadata);
            match serde_json::to_value(reply) {
                Ok(result) => Json(JsonRpcResponse::success(id, result)).into_response(),
                Err(e) => Json(JsonRpcResponse::failure(
                    id,
                    codes::INTERNAL_ERROR,
                    e.to_string(),
                ))
                .into_response(),
            }
        }
        Err(e) => {
            warn!(agent_id = %agent_id, error = %e, "A2A execution failed");
            Json(JsonRpcResponse::failure(id, codes::INTERNAL_ERROR, e.to_string())).into_response()
        }
    }
}

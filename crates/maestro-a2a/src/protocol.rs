//! A2A wire types: JSON-RPC 2.0 envelopes, messages and agent cards.

use maestro_core::AgentConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version carried in every envelope.
pub const JSONRPC_VERSION: &str = "2.0";
/// The only A2A method the server implements.
pub const METHOD_MESSAGE_SEND: &str = "message/send";

/// JSON-RPC error codes used by the A2A server.
pub mod codes {
    /// Unknown `method`.
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Malformed `params` or an empty message.
    pub const INVALID_PARAMS: i64 = -32602;
    /// Agent lookup or execution failed.
    pub const INTERNAL_ERROR: i64 = -32603;
}

/// JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Request id; string or number, echoed back in the response.
    #[serde(default)]
    pub id: Value,
    /// Method name, e.g. `message/send`.
    pub method: String,
    /// Method parameters.
    #[serde(default)]
    pub params: Value,
}

impl JsonRpcRequest {
    /// A `message/send` call carrying one user text part, with a fresh id.
    pub fn message_send(text: impl Into<String>) -> Self {
        let params = MessageSendParams {
            message: A2aMessage::user_text(text),
        };
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Value::String(uuid::Uuid::new_v4().to_string()),
            method: METHOD_MESSAGE_SEND.to_string(),
            params: serde_json::to_value(params).unwrap_or_default(),
        }
    }
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Id of the request being answered.
    #[serde(default)]
    pub id: Value,
    /// Present on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Present on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Successful response carrying `result`.
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Error response with the given JSON-RPC code.
    pub fn failure(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// JSON-RPC error code.
    pub code: i64,
    /// Human-readable description.
    #[serde(default)]
    pub message: String,
    /// Optional structured detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// `params` of a `message/send` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageSendParams {
    /// Message to deliver to the agent.
    pub message: A2aMessage,
}

/// One message part. Only text parts are produced; other kinds are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    /// Part kind; `text` for every part this crate produces.
    #[serde(default = "default_part_kind")]
    pub kind: String,
    /// Text content of a `text` part.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Part {
    /// A text part.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: default_part_kind(),
            text: Some(text.into()),
        }
    }
}

fn default_part_kind() -> String {
    "text".to_string()
}

fn default_message_kind() -> String {
    "message".to_string()
}

fn default_role() -> String {
    "user".to_string()
}

/// An A2A message, sent by the caller or returned as the call result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct A2aMessage {
    /// Always `message`.
    #[serde(default = "default_message_kind")]
    pub kind: String,
    /// `user` on requests, `agent` on replies.
    #[serde(default = "default_role")]
    pub role: String,
    /// Message content.
    #[serde(default)]
    pub parts: Vec<Part>,
    /// Sender-assigned message id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Conversation id, when the caller tracks one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
    /// Execution metadata attached to replies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ResultMetadata>,
}

impl A2aMessage {
    /// A user message with one text part.
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            kind: default_message_kind(),
            role: default_role(),
            parts: vec![Part::text(text)],
            message_id: None,
            context_id: None,
            metadata: None,
        }
    }

    /// Agent reply with execution metadata attached.
    pub fn agent_reply(text: impl Into<String>, metadata: ResultMetadata) -> Self {
        Self {
            kind: default_message_kind(),
            role: "agent".to_string(),
            parts: vec![Part::text(text)],
            message_id: Some(uuid::Uuid::new_v4().to_string()),
            context_id: None,
            metadata: Some(metadata),
        }
    }

    /// Text of all `text` parts, concatenated as sent.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter(|p| p.kind == "text")
            .filter_map(|p| p.text.as_deref())
            .collect()
    }

    /// Inbound text: every part carrying text, joined by spaces and trimmed.
    pub fn input_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect::<Vec<_>>()
            .join(" ")
            .trim()
            .to_string()
    }
}

/// Execution details carried in `result.metadata`.
///
/// `chatter_events` stays untyped here so a single malformed event from a
/// remote installation does not invalidate the whole reply.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultMetadata {
    /// Progress events the callee emitted while answering.
    #[serde(default)]
    pub chatter_events: Vec<Value>,
    /// Callee-side execution time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
    /// Prompt tokens spent by the callee.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_input: Option<u64>,
    /// Completion tokens spent by the callee.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_output: Option<u64>,
}

/// A skill advertised on an agent card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSkill {
    /// Skill id; the agent id for local agents.
    pub id: String,
    /// Display name.
    pub name: String,
    /// What the skill does.
    #[serde(default)]
    pub description: Option<String>,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Sample prompts.
    #[serde(default)]
    pub examples: Vec<String>,
}

/// Optional A2A features an agent supports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentCapabilities {
    /// Whether replies may be streamed.
    #[serde(default)]
    pub streaming: bool,
    /// Whether push notifications are supported.
    #[serde(default, alias = "pushNotifications")]
    pub push_notifications: bool,
    /// Whether task state history is kept.
    #[serde(default, alias = "stateTransitionHistory")]
    pub state_transition_history: bool,
}

impl Default for AgentCapabilities {
    fn default() -> Self {
        Self {
            streaming: true,
            push_notifications: false,
            state_transition_history: false,
        }
    }
}

fn default_card_version() -> String {
    "1.0".to_string()
}

fn default_modes() -> Vec<String> {
    vec!["text".to_string()]
}

/// Agent card returned by the discovery endpoints.
///
/// Field names are snake_case on output; camelCase is accepted on input so
/// cards from other A2A implementations can be read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentCard {
    /// Display name.
    pub name: String,
    /// What the agent does.
    #[serde(default)]
    pub description: Option<String>,
    /// Endpoint accepting `message/send`.
    pub url: String,
    /// Card version.
    #[serde(default = "default_card_version")]
    pub version: String,
    /// A2A protocol version implemented.
    #[serde(default, alias = "protocolVersion")]
    pub protocol_version: Option<String>,
    /// Supported optional features.
    #[serde(default)]
    pub capabilities: AgentCapabilities,
    /// Advertised skills.
    #[serde(default)]
    pub skills: Vec<AgentSkill>,
    /// Accepted input content types.
    #[serde(default = "default_modes", alias = "defaultInputModes")]
    pub default_input_modes: Vec<String>,
    /// Produced output content types.
    #[serde(default = "default_modes", alias = "defaultOutputModes")]
    pub default_output_modes: Vec<String>,
}

impl AgentCard {
    /// Card for a locally hosted agent reachable at `{base_url}/a2a/{id}`.
    pub fn for_agent(agent: &AgentConfig, base_url: &str) -> Self {
        let description = Some(agent.description.clone());
        Self {
            name: agent.name.clone(),
            description: description.clone(),
            url: format!("{}/a2a/{}", base_url.trim_end_matches('/'), agent.id),
            version: default_card_version(),
            protocol_version: Some("0.3.0".to_string()),
            capabilities: AgentCapabilities::default(),
            skills: vec![AgentSkill {
                id: agent.id.clone(),
                name: agent.name.clone(),
                description,
                tags: Vec::new(),
                examples: Vec::new(),
            }],
            default_input_modes: default_modes(),
            default_output_modes: default_modes(),
        }
    }
}

/// Body of `GET /.well-known/agent.json` on a multi-agent installation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDirectory {
    /// Cards of every A2A-enabled agent.
    pub agents: Vec<AgentCard>,
    /// Number of cards.
    pub count: usize,
}

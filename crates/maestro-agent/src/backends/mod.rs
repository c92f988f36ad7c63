//! Chat completion backends and the factory that picks one per agent.

pub mod openai;

use crate::config::ModelConfig;
use crate::retry::RetryingBackend;
use crate::stream::ChatUpdate;
use crate::tool::ToolDescriptor;
use async_trait::async_trait;
use maestro_core::{AgentConfig, MaestroResult, Message};
use std::sync::Arc;
use tokio::sync::mpsc;

pub use openai::OpenAiBackend;

/// Update fragments of one model call. Mid-stream failures arrive as `Err`
/// items; the stream ends when the sender is dropped.
pub type ChatStream = mpsc::Receiver<MaestroResult<ChatUpdate>>;

/// Input to a single model call.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    /// System instructions, sent first when present.
    pub instructions: Option<String>,
    /// Conversation turns, oldest first.
    pub turns: Vec<Message>,
    /// Empty for the no-tools mode used by analysis, synthesis and evaluation.
    pub tools: Vec<ToolDescriptor>,
}

impl ChatRequest {
    /// A request without tools.
    pub fn new(instructions: Option<String>, turns: Vec<Message>) -> Self {
        Self {
            instructions,
            turns,
            tools: Vec::new(),
        }
    }

    /// Offer `tools` to the model.
    pub fn with_tools(mut self, tools: Vec<ToolDescriptor>) -> Self {
        self.tools = tools;
        self
    }
}

/// Trait that every chat completion provider implements.
///
/// `stream` returns once the call is accepted; an `Err` here means the
/// backend could not be reached or refused the request.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Start one model call.
    async fn stream(&self, request: &ChatRequest) -> MaestroResult<ChatStream>;
}

/// Builds the chat backend used for a given agent.
pub trait BackendFactory: Send + Sync {
    /// Backend for `agent`, honoring its model and settings overrides.
    fn backend_for(&self, agent: &AgentConfig) -> MaestroResult<Arc<dyn ChatBackend>>;
}

/// Default factory: an OpenAI-compatible backend per agent, wrapped in
/// retries when the settings carry a retry policy.
pub struct ProviderBackendFactory {
    settings: ModelConfig,
}

impl ProviderBackendFactory {
    /// Factory building backends from `settings`.
    pub fn new(settings: ModelConfig) -> Self {
        Self { settings }
    }
}

impl BackendFactory for ProviderBackendFactory {
    fn backend_for(&self, agent: &AgentConfig) -> MaestroResult<Arc<dyn ChatBackend>> {
        let config = self.settings.for_agent(agent)?;
        let policy = config.retry_policy.clone();
        let backend: Arc<dyn ChatBackend> = Arc::new(OpenAiBackend::new(config)?);
        Ok(match policy {
            Some(policy) => Arc::new(RetryingBackend::new(backend, policy)),
            None => backend,
        })
    }
}

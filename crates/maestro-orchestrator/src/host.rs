//! Runs locally hosted agents behind the A2A server.

use crate::cache::AgentConfigCache;
use crate::prompts::agent_instructions;
use async_trait::async_trait;
use maestro_a2a::{A2aAgentHandler, LocalExecution};
use maestro_agent::executor::DEFAULT_POLL_INTERVAL;
use maestro_agent::{
    chat_gate, BackendFactory, GatedBackend, StreamingExecutor, ToolContext, ToolProvider,
    DEFAULT_CHAT_CONCURRENCY,
};
use maestro_core::{progress_bus, AgentConfig, MaestroResult, Message};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::info;

/// [`A2aAgentHandler`] that executes agents with the streaming executor.
///
/// Every model call made by a hosted agent takes a permit from one shared
/// gate, so concurrent specialists never exceed the configured number of
/// in-flight chat calls. Delegation tools run between model calls and hold
/// no permit.
pub struct LocalAgentHost {
    cache: Arc<AgentConfigCache>,
    backends: Arc<dyn BackendFactory>,
    tools: Arc<dyn ToolProvider>,
    gate: Arc<Semaphore>,
    poll_interval: Duration,
}

impl LocalAgentHost {
    /// Host agents from `cache`, with [`DEFAULT_CHAT_CONCURRENCY`] permits.
    pub fn new(
        cache: Arc<AgentConfigCache>,
        backends: Arc<dyn BackendFactory>,
        tools: Arc<dyn ToolProvider>,
    ) -> Self {
        Self {
            cache,
            backends,
            tools,
            gate: chat_gate(DEFAULT_CHAT_CONCURRENCY),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Builder: size of the shared model-call gate.
    pub fn with_concurrency(mut self, permits: usize) -> Self {
        self.gate = chat_gate(permits);
        self
    }

    /// Builder: how long each bus poll waits.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

#[async_trait]
impl A2aAgentHandler for LocalAgentHost {
    async fn agents(&self) -> MaestroResult<Vec<AgentConfig>> {
        self.cache.list_all().await
    }

    async fn agent(&self, id: &str) -> MaestroResult<Option<AgentConfig>> {
        self.cache.resolve(id).await
    }

    async fn execute(
        &self,
        agent: &AgentConfig,
        text: &str,
        auth_token: Option<&str>,
    ) -> MaestroResult<LocalExecution> {
        agent.model_ref()?;
        let backend = Arc::new(GatedBackend::new(
            self.backends.backend_for(agent)?,
            self.gate.clone(),
        ));

        let (events, mut bus) = progress_bus();
        let context = ToolContext {
            auth_token: auth_token.map(str::to_string),
            events: Some(events),
        };
        let tools = self.tools.tools_for(agent, &context).await?;
        // Only the tools keep senders alive; the bus closes when they finish.
        drop(context);

        let agent_names: Vec<String> = self
            .cache
            .list_all()
            .await?
            .into_iter()
            .map(|a| a.name)
            .collect();
        info!(agent = %agent.name, tools = tools.len(), "Executing local agent");

        let executor = StreamingExecutor::new(backend, &agent.name)
            .with_tools(tools)
            .with_delegation_targets(agent_names)
            .with_poll_interval(self.poll_interval);
        let instructions = agent_instructions(agent);
        let run = executor
            .run(Some(&instructions), &[Message::user(text)], Some(&mut bus))
            .await?;

        Ok(LocalExecution {
            text: run.text,
            events: run.events,
            duration_ms: run.duration_ms,
            tokens_input: run.usage.input,
            tokens_output: run.usage.output,
        })
    }
}

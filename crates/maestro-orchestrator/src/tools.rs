//! Delegation tools: an agent that declares `agent:<id>` can call that agent
//! over A2A as an ordinary tool.

use crate::cache::AgentConfigCache;
use crate::specialist::SpecialistCaller;
use async_trait::async_trait;
use maestro_agent::{Tool, ToolContext, ToolDescriptor, ToolProvider};
use maestro_core::{AgentConfig, MaestroResult, ProgressSender, ToolCall, ToolResult};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

/// Prefix of a declared tool reference that points at another agent.
pub const AGENT_TOOL_PREFIX: &str = "agent:";

/// Calls one specialist; the model passes the request through verbatim.
pub struct SpecialistTool {
    agent: AgentConfig,
    caller: SpecialistCaller,
    auth_token: Option<String>,
    events: Option<ProgressSender>,
    descriptor: ToolDescriptor,
}

impl SpecialistTool {
    /// Tool delegating to `agent`, carrying the caller's credential and bus.
    pub fn new(agent: AgentConfig, caller: SpecialistCaller, context: &ToolContext) -> Self {
        let base = if agent.description.trim().is_empty() {
            format!("Specialist agent: {}", agent.name)
        } else {
            agent.description.clone()
        };
        let descriptor = ToolDescriptor {
            name: agent.sanitized_name().to_lowercase(),
            description: format!(
                "{base}. Pass the user's request directly without adding commentary or \
                 assumptions; this agent has its own tools to find what it needs."
            ),
            parameters_schema: json!({
                "type": "object",
                "properties": {
                    "request": {
                        "type": "string",
                        "description": "The user's exact request, unmodified."
                    }
                },
                "required": ["request"]
            }),
        };
        Self {
            agent,
            caller,
            auth_token: context.auth_token.clone(),
            events: context.events.clone(),
            descriptor,
        }
    }
}

#[async_trait]
impl Tool for SpecialistTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, call: ToolCall) -> MaestroResult<ToolResult> {
        let request = match call.arguments.get("request").and_then(|v| v.as_str()) {
            Some(text) => text.to_string(),
            None => call.arguments.to_string(),
        };
        let result = self
            .caller
            .call(
                &self.agent,
                &request,
                self.auth_token.as_deref(),
                self.events.as_ref(),
            )
            .await;
        Ok(match result.error {
            Some(error) => ToolResult::error(
                call.id,
                format!("Error calling {}: {error}", self.agent.name),
            ),
            None => ToolResult::success(call.id, result.response),
        })
    }
}

/// Provisions delegation tools for `agent:<id>` references and hands every
/// other reference to `fallback`.
pub struct AgentToolProvider {
    cache: Arc<AgentConfigCache>,
    caller: SpecialistCaller,
    fallback: Arc<dyn ToolProvider>,
}

impl AgentToolProvider {
    /// Provider resolving `agent:` references through `cache`.
    pub fn new(
        cache: Arc<AgentConfigCache>,
        caller: SpecialistCaller,
        fallback: Arc<dyn ToolProvider>,
    ) -> Self {
        Self {
            cache,
            caller,
            fallback,
        }
    }
}

#[async_trait]
impl ToolProvider for AgentToolProvider {
    async fn tools_for(
        &self,
        agent: &AgentConfig,
        context: &ToolContext,
    ) -> MaestroResult<Vec<Arc<dyn Tool>>> {
        let mut tools: Vec<Arc<dyn Tool>> = Vec::new();
        let mut other_refs = Vec::new();

        for reference in &agent.tools {
            let Some(target_id) = reference.strip_prefix(AGENT_TOOL_PREFIX) else {
                other_refs.push(reference.clone());
                continue;
            };
            if target_id == agent.id {
                warn!(agent = %agent.name, "Agent declares itself as a tool, skipping");
                continue;
            }
            match self.cache.resolve(target_id).await? {
                Some(target) => {
                    debug!(agent = %agent.name, target = %target.name, "Delegation tool attached");
                    tools.push(Arc::new(SpecialistTool::new(
                        target,
                        self.caller.clone(),
                        context,
                    )));
                }
                None => warn!(agent = %agent.name, target_id, "Delegation target not found"),
            }
        }

        if !other_refs.is_empty() {
            let mut rest = agent.clone();
            rest.tools = other_refs;
            tools.extend(self.fallback.tools_for(&rest, context).await?);
        }
        Ok(tools)
    }
}

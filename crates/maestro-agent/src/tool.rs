//! Tool handles attached to an agent's chat client.

use async_trait::async_trait;
use maestro_core::{AgentConfig, MaestroResult, ProgressSender, ToolCall, ToolResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Describes a tool to the model. The schema is passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Name the model calls the tool by.
    pub name: String,
    /// When to use the tool.
    pub description: String,
    /// JSON schema of the arguments.
    pub parameters_schema: serde_json::Value,
}

/// An invocable tool.
#[async_trait]
pub trait Tool: Send + Sync {
    /// How the tool is presented to the model.
    fn descriptor(&self) -> &ToolDescriptor;

    /// Run the tool. An `Err` is reported to the model as a failed result.
    async fn invoke(&self, call: ToolCall) -> MaestroResult<ToolResult>;
}

/// Request-scoped context handed to tool provisioning.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// Caller's bearer credential, forwarded to tools that call out.
    pub auth_token: Option<String>,
    /// Bus that nested executions report progress on.
    pub events: Option<ProgressSender>,
}

/// Turns an agent's declared tool references into invocable handles.
#[async_trait]
pub trait ToolProvider: Send + Sync {
    /// Handles for every tool `agent` declares; unknown references are skipped.
    async fn tools_for(
        &self,
        agent: &AgentConfig,
        context: &ToolContext,
    ) -> MaestroResult<Vec<Arc<dyn Tool>>>;
}

/// Provisions nothing. Used when no tool source is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTools;

#[async_trait]
impl ToolProvider for NoTools {
    async fn tools_for(
        &self,
        _agent: &AgentConfig,
        _context: &ToolContext,
    ) -> MaestroResult<Vec<Arc<dyn Tool>>> {
        Ok(Vec::new())
    }
}

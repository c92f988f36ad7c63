//! Agent configuration as owned by the external configuration store.

use crate::{MaestroError, MaestroResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether an agent coordinates a turn or answers delegated requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    /// Runs Analysis and Synthesis for a turn.
    Orchestrator,
    /// Answers domain-specific requests.
    #[default]
    Specialist,
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Orchestrator => write!(f, "orchestrator"),
            Self::Specialist => write!(f, "specialist"),
        }
    }
}

/// Where an agent executes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    /// Hosted by this installation and exposed at `/a2a/{id}`.
    #[default]
    Local,
    /// Hosted elsewhere and reached at its configured `a2a_url`.
    #[serde(rename = "a2a", alias = "remote")]
    Remote,
}

/// A single agent definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Unique identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Free-text description used in catalogs and agent cards.
    #[serde(default)]
    pub description: String,
    /// Orchestrator or specialist.
    #[serde(default)]
    pub role: AgentRole,
    /// Local or remote execution.
    #[serde(default)]
    pub kind: AgentKind,
    /// Base instructions for the agent's own model calls.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Override for the Phase 1 analysis template.
    #[serde(default)]
    pub analysis_prompt: Option<String>,
    /// Override for the Phase 3 synthesis template.
    #[serde(default)]
    pub synthesis_prompt: Option<String>,
    /// Model or deployment reference.
    #[serde(default)]
    pub model: Option<String>,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Per-agent completion limit; falls back to the backend default.
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Declared tool references, resolved by the tool provider.
    #[serde(default)]
    pub tools: Vec<String>,
    /// Endpoint of a remote agent.
    #[serde(default)]
    pub a2a_url: Option<String>,
    /// Bearer sent to a remote agent. Callers' own tokens never leave this
    /// installation.
    #[serde(default, skip_serializing)]
    pub a2a_api_key: Option<String>,
    /// Whether the A2A server exposes this agent.
    #[serde(default = "default_a2a_enabled")]
    pub a2a_enabled: bool,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_a2a_enabled() -> bool {
    true
}

impl AgentConfig {
    /// A local specialist with default settings.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            role: AgentRole::Specialist,
            kind: AgentKind::Local,
            system_prompt: None,
            analysis_prompt: None,
            synthesis_prompt: None,
            model: None,
            temperature: default_temperature(),
            max_tokens: None,
            tools: Vec::new(),
            a2a_url: None,
            a2a_api_key: None,
            a2a_enabled: true,
        }
    }

    /// Builder: set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Builder: mark as the orchestrator.
    pub fn orchestrator(mut self) -> Self {
        self.role = AgentRole::Orchestrator;
        self
    }

    /// Builder: set the model reference.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Builder: set the system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Builder: declare tool references.
    pub fn with_tools(mut self, tools: Vec<String>) -> Self {
        self.tools = tools;
        self
    }

    /// Builder: turn this into a remote agent reached at `url`.
    pub fn remote(mut self, url: impl Into<String>) -> Self {
        self.kind = AgentKind::Remote;
        self.a2a_url = Some(url.into());
        self
    }

    /// Builder: bearer for a remote agent.
    pub fn with_a2a_api_key(mut self, key: impl Into<String>) -> Self {
        self.a2a_api_key = Some(key.into());
        self
    }

    /// True for the orchestrator role.
    pub fn is_orchestrator(&self) -> bool {
        self.role == AgentRole::Orchestrator
    }

    /// True for locally hosted agents.
    pub fn is_local(&self) -> bool {
        self.kind == AgentKind::Local
    }

    /// The model reference, or a configuration error naming the agent.
    pub fn model_ref(&self) -> MaestroResult<&str> {
        match self.model.as_deref() {
            Some(m) if !m.trim().is_empty() => Ok(m),
            _ => Err(MaestroError::Configuration(format!(
                "Agent '{}' does not have a model configured.",
                self.name
            ))),
        }
    }

    /// Name accepted by chat APIs: no whitespace and none of `<>|/\`.
    pub fn sanitized_name(&self) -> String {
        self.name
            .chars()
            .filter(|c| !matches!(c, '<' | '>' | '|' | '/' | '\\'))
            .map(|c| if c.is_whitespace() { '_' } else { c })
            .collect()
    }

    /// Bearer to present when calling this agent.
    ///
    /// Local agents get the caller's token; remote agents only ever get
    /// their own configured key.
    pub fn bearer_for<'a>(&'a self, caller_token: Option<&'a str>) -> Option<&'a str> {
        match self.kind {
            AgentKind::Local => caller_token,
            AgentKind::Remote => self.a2a_api_key.as_deref().filter(|k| !k.is_empty()),
        }
    }

    /// The A2A endpoint for this agent. Local agents live under `base_url`.
    pub fn endpoint(&self, base_url: &str) -> MaestroResult<String> {
        match self.kind {
            AgentKind::Local => Ok(format!("{}/a2a/{}", base_url.trim_end_matches('/'), self.id)),
            AgentKind::Remote => self
                .a2a_url
                .clone()
                .filter(|u| !u.is_empty())
                .ok_or_else(|| {
                    MaestroError::Configuration(format!(
                        "Remote agent '{}' has no a2a_url",
                        self.name
                    ))
                }),
        }
    }
}

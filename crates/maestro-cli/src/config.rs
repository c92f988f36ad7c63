//! `maestro.toml` layout.

use maestro_agent::ModelConfig;
use maestro_core::{AgentConfig, MaestroError, MaestroResult};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

/// Environment variable that overrides `backend.api_key`.
pub const API_KEY_ENV: &str = "MAESTRO_API_KEY";

/// Contents of `maestro.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct MaestroConfig {
    pub backend: ModelConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub orchestration: OrchestrationConfig,
    #[serde(default)]
    pub agents: Vec<AgentConfig>,
}

/// Listener settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Public URL prefix used in agent cards and for calling local agents.
    #[serde(default)]
    pub public_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: None,
        }
    }
}

impl ServerConfig {
    /// Where this process reaches its own A2A server.
    pub fn base_url(&self) -> String {
        if let Some(url) = &self.public_url {
            return url.trim_end_matches('/').to_string();
        }
        let host = match self.host.as_str() {
            "0.0.0.0" | "::" | "" => "127.0.0.1",
            other => other,
        };
        format!("http://{host}:{}", self.port)
    }
}

/// Inbound authentication.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SecurityConfig {
    /// Accepted bearer keys for A2A POSTs. Empty accepts any bearer.
    #[serde(default)]
    pub api_keys: Vec<String>,
}

/// Turn execution limits.
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestrationConfig {
    /// Magentic round limit.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
    /// Model calls that hosted agents may have in flight at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Nested progress polling interval.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Timeout of one A2A call.
    #[serde(default = "default_a2a_timeout_secs")]
    pub a2a_timeout_secs: u64,
    /// Conversation turns sent to each model call.
    #[serde(default = "default_history_window")]
    pub history_window: usize,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            concurrency: default_concurrency(),
            poll_interval_ms: default_poll_interval_ms(),
            a2a_timeout_secs: default_a2a_timeout_secs(),
            history_window: default_history_window(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    5000
}
fn default_max_rounds() -> u32 {
    10
}
fn default_concurrency() -> usize {
    2
}
fn default_poll_interval_ms() -> u64 {
    50
}
fn default_a2a_timeout_secs() -> u64 {
    120
}
fn default_history_window() -> usize {
    20
}

impl MaestroConfig {
    /// Parse and validate a TOML document.
    pub fn parse(content: &str) -> MaestroResult<Self> {
        let config: MaestroConfig = toml::from_str(content)
            .map_err(|e| MaestroError::Config(format!("Invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse `path`.
    pub fn load(path: &Path) -> MaestroResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MaestroError::Config(format!(
                "Failed to read config file '{}': {e}",
                path.display()
            ))
        })?;
        Self::parse(&content)
    }

    /// Apply `MAESTRO_API_KEY` when it is set and non-empty.
    pub fn apply_env(&mut self) {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.is_empty() {
                self.backend.api_key = key;
            }
        }
    }

    /// Reject duplicate agent ids and misconfigured agents.
    pub fn validate(&self) -> MaestroResult<()> {
        validate_agents(&self.agents)
    }
}

/// Agent ids must be unique and non-empty.
pub fn validate_agents(agents: &[AgentConfig]) -> MaestroResult<()> {
    let mut seen = HashSet::new();
    for agent in agents {
        if agent.id.trim().is_empty() {
            return Err(MaestroError::Config(format!(
                "Agent '{}' has an empty id",
                agent.name
            )));
        }
        if !seen.insert(agent.id.as_str()) {
            return Err(MaestroError::Config(format!(
                "Duplicate agent id '{}'",
                agent.id
            )));
        }
    }
    Ok(())
}

//! Model backend settings and per-agent resolution.

use crate::retry::RetryPolicy;
use maestro_core::{AgentConfig, MaestroError, MaestroResult};
use serde::{Deserialize, Serialize};

/// Chat completion provider. All speak the OpenAI chat-completions dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// api.openai.com
    OpenAi,
    /// Azure OpenAI deployments; the model reference is the deployment name.
    #[serde(rename = "azure", alias = "azure_openai")]
    AzureOpenAi,
    /// OpenRouter.
    OpenRouter,
    /// Groq cloud inference.
    Groq,
}

/// Backend settings shared by every agent; agents only pick the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Provider dialect and default endpoint.
    pub provider: LlmProvider,
    /// Filled from the agent's model reference by [`ModelConfig::for_agent`].
    #[serde(default)]
    pub model_id: String,
    /// Provider credential; empty for local gateways.
    #[serde(default)]
    pub api_key: String,
    /// Endpoint override; required for Azure.
    pub api_base_url: Option<String>,
    /// Only used by Azure.
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Completion token cap per call.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Upper bound on model calls within one tool-use loop.
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
    /// Request-scoped timeout for a single model call.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Retries for transient failures; none when absent.
    #[serde(default)]
    pub retry_policy: Option<RetryPolicy>,
}

fn default_api_version() -> String {
    "2024-10-21".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_max_turns() -> u32 {
    20
}

fn default_timeout_secs() -> u64 {
    60
}

impl ModelConfig {
    /// Minimal settings for a provider; everything else defaulted.
    pub fn new(provider: LlmProvider, api_key: impl Into<String>) -> Self {
        Self {
            provider,
            model_id: String::new(),
            api_key: api_key.into(),
            api_base_url: None,
            api_version: default_api_version(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            max_turns: default_max_turns(),
            timeout_secs: default_timeout_secs(),
            retry_policy: None,
        }
    }

    /// Endpoint root without a trailing slash.
    pub fn base_url(&self) -> &str {
        if let Some(url) = &self.api_base_url {
            url.trim_end_matches('/')
        } else {
            match self.provider {
                LlmProvider::OpenAi => "https://api.openai.com",
                LlmProvider::AzureOpenAi => "",
                LlmProvider::OpenRouter => "https://openrouter.ai/api",
                LlmProvider::Groq => "https://api.groq.com/openai",
            }
        }
    }

    /// Full chat-completions URL for the configured model.
    pub fn completions_url(&self) -> String {
        match self.provider {
            LlmProvider::AzureOpenAi => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                self.base_url(),
                self.model_id,
                self.api_version
            ),
            _ => format!("{}/v1/chat/completions", self.base_url()),
        }
    }

    /// Settings for one agent: its model reference and sampling overrides.
    ///
    /// Fails with a configuration error when the agent has no model, or when
    /// Azure is selected without an endpoint.
    pub fn for_agent(&self, agent: &AgentConfig) -> MaestroResult<ModelConfig> {
        let model_id = agent.model_ref()?.to_string();
        if self.provider == LlmProvider::AzureOpenAi && self.api_base_url.is_none() {
            return Err(MaestroError::Configuration(
                "Azure OpenAI requires backend.api_base_url".to_string(),
            ));
        }
        Ok(ModelConfig {
            model_id,
            temperature: agent.temperature,
            max_tokens: agent.max_tokens.unwrap_or(self.max_tokens),
            ..self.clone()
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_completions_url_per_provider() {
        let mut cfg = ModelConfig::new(LlmProvider::Groq, "k");
        assert_eq!(
            cfg.completions_url(),
            "https://api.groq.com/openai/v1/chat/completions"
        );

        cfg.provider = LlmProvider::AzureOpenAi;
        cfg.api_base_url = Some("https://res.openai.azure.com/".into());
        cfg.model_id = "gpt-4o".into();
        assert_eq!(
            cfg.completions_url(),
            "https://res.openai.azure.com/openai/deployments/gpt-4o/chat/completions?api-version=2024-10-21"
        );
    }

    #[test]
    fn test_for_agent_uses_agent_model_and_overrides() {
        let base = ModelConfig::new(LlmProvider::OpenAi, "k");
        let mut agent = AgentConfig::new("a", "Analyst").with_model("gpt-4o-mini");
        agent.temperature = 0.1;
        agent.max_tokens = Some(512);

        let cfg = base.for_agent(&agent).unwrap();
        assert_eq!(cfg.model_id, "gpt-4o-mini");
        assert_eq!(cfg.max_tokens, 512);
        assert!((cfg.temperature - 0.1).abs() < f32::EPSILON);
    }

    #[test]
    fn test_for_agent_without_model_is_configuration_error() {
        let base = ModelConfig::new(LlmProvider::OpenAi, "k");
        let agent = AgentConfig::new("a", "Nameless");
        assert!(matches!(
            base.for_agent(&agent),
            Err(MaestroError::Configuration(_))
        ));
    }

    #[test]
    fn test_azure_without_endpoint_rejected() {
        let base = ModelConfig::new(LlmProvider::AzureOpenAi, "k");
        let agent = AgentConfig::new("a", "A").with_model("dep");
        assert!(base.for_agent(&agent).is_err());
    }
}

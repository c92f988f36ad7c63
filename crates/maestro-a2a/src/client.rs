//! Outbound A2A calls.

use crate::protocol::{A2aMessage, AgentCard, AgentDirectory, JsonRpcRequest, JsonRpcResponse};
use async_trait::async_trait;
use maestro_core::{MaestroError, MaestroResult, ProgressEvent};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Default request timeout for cross-agent calls.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(120);

const ERROR_BODY_PREVIEW_CHARS: usize = 200;

/// Result of one A2A call. Failures are carried in `error`, never raised.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct A2aCallOutcome {
    /// Concatenated text parts of the reply.
    pub text: String,
    /// Progress events reported by the callee, in the order it sent them.
    pub events: Vec<ProgressEvent>,
    /// Callee-reported duration when present, local wall clock otherwise.
    pub duration_ms: f64,
    /// Prompt tokens reported by the callee.
    pub tokens_input: Option<u64>,
    /// Completion tokens reported by the callee.
    pub tokens_output: Option<u64>,
    /// Transport, HTTP or JSON-RPC failure.
    pub error: Option<String>,
}

impl A2aCallOutcome {
    fn failed(error: String, started: Instant) -> Self {
        Self {
            duration_ms: elapsed_ms(started),
            error: Some(error),
            ..Self::default()
        }
    }

    /// True when the call failed.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Transport used by the pattern executor and delegation tools.
#[async_trait]
pub trait A2aTransport: Send + Sync {
    /// Send `text` to the agent at `url`. Never fails; errors land in the outcome.
    async fn call(&self, url: &str, text: &str, auth_token: Option<&str>) -> A2aCallOutcome;
}

/// HTTP implementation of [`A2aTransport`].
#[derive(Debug, Clone)]
pub struct A2aClient {
    http: reqwest::Client,
}

impl A2aClient {
    /// Client whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> MaestroResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MaestroError::Http(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { http })
    }

    /// Fetch the card(s) published at `{base_url}/.well-known/agent.json`.
    ///
    /// Accepts either a single card or a `{agents, count}` directory.
    pub async fn discover(&self, base_url: &str) -> MaestroResult<Vec<AgentCard>> {
        let url = format!("{}/.well-known/agent.json", base_url.trim_end_matches('/'));
        info!(url = %url, "Discovering A2A agent");
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| MaestroError::Http(format!("Discovery request failed: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(MaestroError::Http(format!(
                "Discovery failed with HTTP {}",
                status.as_u16()
            )));
        }
        let document: DiscoveryDocument = resp
            .json()
            .await
            .map_err(|e| MaestroError::Http(format!("Invalid agent card: {e}")))?;
        let cards = match document {
            DiscoveryDocument::Directory(dir) => dir.agents,
            DiscoveryDocument::Card(card) => vec![*card],
        };
        info!(count = cards.len(), "Discovered A2A agents");
        Ok(cards)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DiscoveryDocument {
    Directory(AgentDirectory),
    Card(Box<AgentCard>),
}

#[async_trait]
impl A2aTransport for A2aClient {
    async fn call(&self, url: &str, text: &str, auth_token: Option<&str>) -> A2aCallOutcome {
        let started = Instant::now();
        let payload = JsonRpcRequest::message_send(text);
        let mut request = self.http.post(url).json(&payload);
        if let Some(token) = auth_token {
            request = request.bearer_auth(token);
        }

        let resp = match request.send().await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(url = %url, error = %e, "A2A call failed");
                return A2aCallOutcome::failed(e.to_string(), started);
            }
        };

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let preview: String = body.chars().take(ERROR_BODY_PREVIEW_CHARS).collect();
            warn!(url = %url, status = status.as_u16(), "A2A call rejected");
            return A2aCallOutcome::failed(format!("HTTP {}: {preview}", status.as_u16()), started);
        }

        let envelope: JsonRpcResponse = match resp.json().await {
            Ok(envelope) => envelope,
            Err(e) => return A2aCallOutcome::failed(format!("Invalid A2A response: {e}"), started),
        };
        if let Some(err) = envelope.error {
            let message = if err.message.is_empty() {
                "Unknown error".to_string()
            } else {
                err.message
            };
            warn!(url = %url, code = err.code, error = %message, "A2A call returned an error");
            return A2aCallOutcome::failed(message, started);
        }

        let parsed = envelope
            .result
            .map(serde_json::from_value::<A2aMessage>)
            .transpose();
        let message = match parsed {
            Ok(Some(message)) => message,
            Ok(None) => return A2aCallOutcome::failed("Unknown error".to_string(), started),
            Err(e) => return A2aCallOutcome::failed(format!("Invalid A2A result: {e}"), started),
        };

        let metadata = message.metadata.clone().unwrap_or_default();
        let events = metadata
            .chatter_events
            .into_iter()
            .filter_map(|raw| match serde_json::from_value::<ProgressEvent>(raw) {
                Ok(event) => Some(event),
                Err(e) => {
                    debug!(error = %e, "Skipping malformed chatter event");
                    None
                }
            })
            .collect::<Vec<_>>();

        let text = message.text();
        debug!(url = %url, chars = text.len(), events = events.len(), "A2A call completed");
        A2aCallOutcome {
            text,
            events,
            duration_ms: metadata.duration_ms.unwrap_or_else(|| elapsed_ms(started)),
            tokens_input: metadata.tokens_input,
            tokens_output: metadata.tokens_output,
            error: None,
        }
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

//! Streaming chat completions over server-sent events.

use super::{ChatBackend, ChatRequest, ChatStream};
use crate::config::{LlmProvider, ModelConfig};
use crate::stream::{ChatUpdate, ToolCallFragment};
use async_trait::async_trait;
use futures_util::StreamExt;
use maestro_core::{MaestroError, MaestroResult, Role};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// OpenAI-compatible streaming backend.
///
/// Works with OpenAI, Azure OpenAI, OpenRouter, Groq and any other provider
/// that implements the chat completions API with server-sent events.
pub struct OpenAiBackend {
    config: ModelConfig,
    http: reqwest::Client,
}

impl OpenAiBackend {
    /// Backend with its own HTTP client; fails only if the client cannot be built.
    pub fn new(config: ModelConfig) -> MaestroResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MaestroError::Http(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { config, http })
    }

    fn build_messages(&self, request: &ChatRequest) -> Vec<serde_json::Value> {
        let mut api_messages: Vec<serde_json::Value> = Vec::new();

        if let Some(sys) = &request.instructions {
            api_messages.push(serde_json::json!({
                "role": "system",
                "content": sys
            }));
        }

        for m in request.turns.iter().filter(|m| m.role != Role::System) {
            api_messages.push(serde_json::json!({
                "role": match m.role {
                    Role::Assistant => "assistant",
                    _ => "user",
                },
                "content": m.content
            }));
        }

        api_messages
    }

    fn build_body(&self, request: &ChatRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.config.model_id,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "messages": self.build_messages(request),
            "stream": true,
            "stream_options": {"include_usage": true},
        });

        if !request.tools.is_empty() {
            let tools: Vec<serde_json::Value> = request
                .tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters_schema,
                        }
                    })
                })
                .collect();
            body["tools"] = serde_json::json!(tools);
        }
        body
    }

    fn add_provider_headers(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = match self.config.provider {
            LlmProvider::AzureOpenAi => request.header("api-key", &self.config.api_key),
            _ => request.header("Authorization", format!("Bearer {}", self.config.api_key)),
        };

        // OpenRouter requires extra headers
        if self.config.provider == LlmProvider::OpenRouter {
            request.header("X-Title", "Maestro")
        } else {
            request
        }
    }
}

#[async_trait]
impl ChatBackend for OpenAiBackend {
    async fn stream(&self, request: &ChatRequest) -> MaestroResult<ChatStream> {
        let url = self.config.completions_url();
        let body = self.build_body(request);

        let resp = self
            .add_provider_headers(self.http.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    MaestroError::Http(format!("Chat API timeout: {e}"))
                } else if e.is_connect() {
                    MaestroError::Http(format!("Chat API connect error: {e}"))
                } else {
                    MaestroError::Http(e.to_string())
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let error_body = resp
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(MaestroError::Http(format!(
                "Chat API error {status}: {error_body}"
            )));
        }

        let (tx, rx) = mpsc::channel(256);
        let mut bytes = resp.bytes_stream();

        tokio::spawn(async move {
            let mut parser = SseParser::default();
            while let Some(chunk) = bytes.next().await {
                match chunk {
                    Ok(chunk) => {
                        for update in parser.feed(&chunk) {
                            if tx.send(Ok(update)).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx
                            .send(Err(MaestroError::Http(format!("Stream read error: {e}"))))
                            .await;
                        return;
                    }
                }
                if parser.is_done() {
                    break;
                }
            }
            for update in parser.finish() {
                if tx.send(Ok(update)).await.is_err() {
                    return;
                }
            }
        });

        Ok(rx)
    }
}

#[derive(Debug, Default)]
struct PendingCall {
    id: String,
    name: String,
    arguments: String,
}

/// Incremental parser for chat-completions server-sent events.
///
/// Argument deltas are surfaced as partial tool-call fragments that carry
/// the call id but no name; the complete fragment is emitted once the
/// choice finishes.
#[derive(Debug, Default)]
pub(crate) struct SseParser {
    buffer: Vec<u8>,
    calls: BTreeMap<u64, PendingCall>,
    done: bool,
}

impl SseParser {
    pub(crate) fn feed(&mut self, chunk: &[u8]) -> Vec<ChatUpdate> {
        self.buffer.extend_from_slice(chunk);
        let mut out = Vec::new();
        while let Some(end) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=end).collect();
            let line = String::from_utf8_lossy(&line);
            self.handle_line(line.trim(), &mut out);
        }
        out
    }

    pub(crate) fn finish(&mut self) -> Vec<ChatUpdate> {
        let mut out = Vec::new();
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let rest = String::from_utf8_lossy(&rest);
            self.handle_line(rest.trim(), &mut out);
        }
        self.flush_calls(&mut out);
        out
    }

    pub(crate) fn is_done(&self) -> bool {
        self.done
    }

    fn handle_line(&mut self, line: &str, out: &mut Vec<ChatUpdate>) {
        if line.is_empty() || line.starts_with(':') {
            return;
        }
        let Some(data) = line.strip_prefix("data:") else {
            return;
        };
        let data = data.trim();
        if data == "[DONE]" {
            self.done = true;
            self.flush_calls(out);
            return;
        }

        let event: serde_json::Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => {
                debug!(error = %e, "Skipping malformed SSE payload");
                return;
            }
        };

        let choice = &event["choices"][0];
        let delta = &choice["delta"];

        if let Some(content) = delta["content"].as_str() {
            if !content.is_empty() {
                out.push(ChatUpdate::text(content));
            }
        }

        if let Some(tc_array) = delta["tool_calls"].as_array() {
            for tc in tc_array {
                let idx = tc["index"].as_u64().unwrap_or(0);
                let entry = self.calls.entry(idx).or_default();
                if let Some(id) = tc["id"].as_str().filter(|s| !s.is_empty()) {
                    entry.id = id.to_string();
                }
                if let Some(name) = tc["function"]["name"].as_str().filter(|s| !s.is_empty()) {
                    entry.name = name.to_string();
                }
                let args_delta = tc["function"]["arguments"].as_str().unwrap_or_default();
                entry.arguments.push_str(args_delta);
                out.push(ChatUpdate::ToolCall(ToolCallFragment::partial(
                    entry.id.clone(),
                    "",
                    args_delta,
                )));
            }
        }

        if choice["finish_reason"].is_string() {
            self.flush_calls(out);
        }

        if event["usage"].is_object() {
            out.push(ChatUpdate::Usage {
                usage: event["usage"].clone(),
            });
        }
    }

    fn flush_calls(&mut self, out: &mut Vec<ChatUpdate>) {
        for call in std::mem::take(&mut self.calls).into_values() {
            out.push(ChatUpdate::ToolCall(ToolCallFragment::complete(
                call.id,
                call.name,
                call.arguments,
            )));
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn sse(payload: &str) -> String {
        format!("data: {payload}\n\n")
    }

    #[test]
    fn test_text_deltas() {
        let mut parser = SseParser::default();
        let mut updates = parser.feed(sse(r#"{"choices":[{"delta":{"content":"Hel"}}]}"#).as_bytes());
        updates.extend(parser.feed(sse(r#"{"choices":[{"delta":{"content":"lo"}}]}"#).as_bytes()));
        assert_eq!(updates, vec![ChatUpdate::text("Hel"), ChatUpdate::text("lo")]);
    }

    #[test]
    fn test_line_split_across_chunks() {
        let mut parser = SseParser::default();
        let line = sse(r#"{"choices":[{"delta":{"content":"ñandú"}}]}"#);
        let bytes = line.as_bytes();
        // Split inside the multi-byte character.
        let cut = line.find('ñ').unwrap() + 1;
        assert!(parser.feed(&bytes[..cut]).is_empty());
        let updates = parser.feed(&bytes[cut..]);
        assert_eq!(updates, vec![ChatUpdate::text("ñandú")]);
    }

    #[test]
    fn test_tool_call_partials_then_complete() {
        let mut parser = SseParser::default();
        let mut updates = Vec::new();
        updates.extend(parser.feed(sse(r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"run_query","arguments":""}}]}}]}"#).as_bytes()));
        updates.extend(parser.feed(sse(r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"query\":"}}]}}]}"#).as_bytes()));
        updates.extend(parser.feed(sse(r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"x\"}"}}]}}]}"#).as_bytes()));
        updates.extend(parser.feed(sse(r#"{"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#).as_bytes()));

        let complete: Vec<&ToolCallFragment> = updates
            .iter()
            .filter_map(|u| match u {
                ChatUpdate::ToolCall(f) if f.complete => Some(f),
                _ => None,
            })
            .collect();
        assert_eq!(complete.len(), 1);
        assert_eq!(complete[0].id, "call_1");
        assert_eq!(complete[0].name, "run_query");
        assert_eq!(complete[0].arguments, r#"{"query":"x"}"#);

        // Partials never carry a name.
        assert!(updates.iter().all(|u| match u {
            ChatUpdate::ToolCall(f) if !f.complete => f.name.is_empty(),
            _ => true,
        }));
    }

    #[test]
    fn test_usage_chunk_and_done() {
        let mut parser = SseParser::default();
        let updates = parser.feed(
            format!(
                "{}{}",
                sse(r#"{"choices":[],"usage":{"prompt_tokens":11,"completion_tokens":3}}"#),
                "data: [DONE]\n"
            )
            .as_bytes(),
        );
        assert_eq!(updates.len(), 1);
        assert!(matches!(&updates[0], ChatUpdate::Usage { usage } if usage["prompt_tokens"] == 11));
        assert!(parser.is_done());
    }

    #[test]
    fn test_comments_and_garbage_ignored() {
        let mut parser = SseParser::default();
        let updates = parser.feed(b": keep-alive\n\ndata: not json\n\nevent: ping\n");
        assert!(updates.is_empty());
    }
}

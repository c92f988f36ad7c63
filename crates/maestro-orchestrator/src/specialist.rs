//! A2A-backed specialist calls shared by the pattern executor and the
//! delegation tools.

use crate::types::SpecialistResult;
use maestro_a2a::A2aTransport;
use maestro_core::{preview, AgentConfig, ProgressEvent, ProgressSender};
use std::sync::Arc;
use tracing::{info, warn};

const DELEGATION_PREVIEW_CHARS: usize = 200;

/// Calls one specialist over A2A and narrates the call on a progress bus.
///
/// Failures never escape: they are recorded on the returned
/// [`SpecialistResult`].
#[derive(Clone)]
pub struct SpecialistCaller {
    transport: Arc<dyn A2aTransport>,
    base_url: String,
}

impl SpecialistCaller {
    /// `base_url` is where this installation's own A2A server is reachable;
    /// local agents are called at `{base_url}/a2a/{id}`.
    pub fn new(transport: Arc<dyn A2aTransport>, base_url: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: base_url.into(),
        }
    }

    /// This installation's public base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Call `agent` with `message` and report progress on `bus`.
    ///
    /// Never fails: transport and endpoint errors come back as a failed
    /// [`SpecialistResult`].
    pub async fn call(
        &self,
        agent: &AgentConfig,
        message: &str,
        auth_token: Option<&str>,
        bus: Option<&ProgressSender>,
    ) -> SpecialistResult {
        let emit = |event: ProgressEvent| {
            if let Some(bus) = bus {
                bus.emit(event);
            }
        };

        emit(
            ProgressEvent::delegation(&agent.name, preview(message, DELEGATION_PREVIEW_CHARS))
                .with_friendly(format!("Asking {}", agent.name)),
        );

        let url = match agent.endpoint(&self.base_url) {
            Ok(url) => url,
            Err(e) => {
                warn!(agent = %agent.name, error = %e, "Specialist has no reachable endpoint");
                return SpecialistResult::failed(&agent.id, &agent.name, e.to_string());
            }
        };

        emit(
            ProgressEvent::thinking(&agent.name, "Working on request...")
                .with_friendly(format!("{} is working on it", agent.name)),
        );
        info!(agent = %agent.name, url = %url, "Calling specialist");

        let outcome = self
            .transport
            .call(&url, message, agent.bearer_for(auth_token))
            .await;
        if let Some(error) = outcome.error {
            warn!(agent = %agent.name, error = %error, "Specialist call failed");
            return SpecialistResult::failed(&agent.id, &agent.name, error);
        }

        for event in outcome.events {
            emit(event.retagged(&agent.name));
        }

        let tokens_input = outcome.tokens_input.unwrap_or(0);
        let tokens_output = outcome.tokens_output.unwrap_or(0);
        emit(
            ProgressEvent::content(
                &agent.name,
                format!("Completed ({} chars)", outcome.text.chars().count()),
            )
            .with_duration(outcome.duration_ms)
            .with_tokens(tokens_input, tokens_output),
        );

        SpecialistResult {
            agent_id: agent.id.clone(),
            agent_name: agent.name.clone(),
            response: outcome.text,
            tokens_input,
            tokens_output,
            error: None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use maestro_a2a::A2aCallOutcome;
    use maestro_core::{progress_bus, ProgressKind};
    use parking_lot::Mutex;

    struct Recorder {
        urls: Mutex<Vec<String>>,
        tokens: Mutex<Vec<Option<String>>>,
        outcome: A2aCallOutcome,
    }

    #[async_trait]
    impl A2aTransport for Recorder {
        async fn call(&self, url: &str, _text: &str, auth: Option<&str>) -> A2aCallOutcome {
            self.urls.lock().push(url.to_string());
            self.tokens.lock().push(auth.map(str::to_string));
            self.outcome.clone()
        }
    }

    fn caller(outcome: A2aCallOutcome) -> (SpecialistCaller, Arc<Recorder>) {
        let recorder = Arc::new(Recorder {
            urls: Mutex::new(Vec::new()),
            tokens: Mutex::new(Vec::new()),
            outcome,
        });
        (
            SpecialistCaller::new(recorder.clone(), "http://host:9000/"),
            recorder,
        )
    }

    #[tokio::test]
    async fn test_success_narrates_and_forwards_nested_events() {
        let (caller, recorder) = caller(A2aCallOutcome {
            text: "forty-two".into(),
            events: vec![ProgressEvent::thinking("inner-name", "querying")],
            duration_ms: 12.0,
            tokens_input: Some(5),
            tokens_output: Some(7),
            error: None,
        });
        let (tx, mut rx) = progress_bus();
        let agent = AgentConfig::new("math", "Math Whiz");

        let result = caller.call(&agent, "What is 6*7?", None, Some(&tx)).await;
        assert_eq!(result.response, "forty-two");
        assert_eq!(result.tokens_used(), 12);
        assert_eq!(recorder.urls.lock().as_slice(), ["http://host:9000/a2a/math"]);

        let events = rx.drain();
        let kinds: Vec<_> = events.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ProgressKind::Delegation,
                ProgressKind::Thinking,
                ProgressKind::Thinking,
                ProgressKind::Content,
            ]
        );
        assert!(events.iter().all(|e| e.agent_name == "Math Whiz"));
        assert_eq!(events[0].content, "What is 6*7?");
        assert_eq!(events[3].content, "Completed (9 chars)");
    }

    #[tokio::test]
    async fn test_failure_is_recorded_not_raised() {
        let (caller, _) = caller(A2aCallOutcome {
            error: Some("HTTP 502: bad gateway".into()),
            ..A2aCallOutcome::default()
        });
        let agent = AgentConfig::new("web", "Web").remote("https://elsewhere/a2a/web");
        let result = caller.call(&agent, "hi", Some("tok"), None).await;
        assert!(result.is_error());
        assert_eq!(result.error.as_deref(), Some("HTTP 502: bad gateway"));
        assert!(result.response.is_empty());
    }

    #[tokio::test]
    async fn test_remote_without_url_fails_without_calling() {
        let (caller, recorder) = caller(A2aCallOutcome::default());
        let mut agent = AgentConfig::new("r", "Remote");
        agent.kind = maestro_core::AgentKind::Remote;
        let result = caller.call(&agent, "hi", None, None).await;
        assert!(result.is_error());
        assert!(recorder.urls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_long_message_preview_is_truncated() {
        let (caller, _) = caller(A2aCallOutcome::default());
        let (tx, mut rx) = progress_bus();
        let message = "x".repeat(500);
        caller
            .call(&AgentConfig::new("a", "A"), &message, None, Some(&tx))
            .await;
        let delegation = &rx.drain()[0];
        assert_eq!(delegation.content.chars().count(), 203);
        assert!(delegation.content.ends_with("..."));
    }

    #[tokio::test]
    async fn test_site_token_is_not_sent_to_remote_agents() {
        let (caller, recorder) = caller(A2aCallOutcome::default());
        let local = AgentConfig::new("math", "Math");
        let partner = AgentConfig::new("p", "Partner").remote("https://partner.example/a2a/p");
        let keyed = AgentConfig::new("k", "Keyed")
            .remote("https://other.example/a2a/k")
            .with_a2a_api_key("partner-key");

        for agent in [&local, &partner, &keyed] {
            caller.call(agent, "hi", Some("site-key"), None).await;
        }

        assert_eq!(
            recorder.tokens.lock().as_slice(),
            [Some("site-key".to_string()), None, Some("partner-key".to_string())]
        );
    }
}

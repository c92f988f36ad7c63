//! Retries for transient backend failures.

use crate::backends::{ChatBackend, ChatRequest, ChatStream};
use async_trait::async_trait;
use maestro_core::{MaestroError, MaestroResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Retry behaviour when opening a model stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Base delay in milliseconds for exponential backoff.
    pub backoff_base_ms: u64,
    /// Maximum delay in milliseconds (cap for exponential backoff).
    pub backoff_max_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base_ms: 500,
            backoff_max_ms: 30_000,
        }
    }
}

/// Whether an error is transient and worth retrying.
///
/// Rate limits, timeouts, connection failures and 5xx responses are;
/// configuration problems and 4xx client errors are not.
pub fn is_retryable(err: &MaestroError) -> bool {
    match err {
        MaestroError::Configuration(_) | MaestroError::Config(_) => false,
        _ => {
            let lower = err.to_string().to_lowercase();
            if lower.contains("400") || lower.contains("404") {
                return false;
            }
            lower.contains("429")
                || lower.contains("timeout")
                || lower.contains("timed out")
                || lower.contains("connect")
                || lower.contains("500")
                || lower.contains("502")
                || lower.contains("503")
                || lower.contains("504")
        }
    }
}

/// Exponential backoff capped at `backoff_max_ms`.
pub fn compute_backoff(policy: &RetryPolicy, attempt: u32) -> u64 {
    let delay = policy
        .backoff_base_ms
        .saturating_mul(2u64.saturating_pow(attempt));
    delay.min(policy.backoff_max_ms)
}

/// Wraps a backend and retries transient failures when opening a stream.
///
/// Failures after the stream has started are passed through untouched.
pub struct RetryingBackend {
    inner: Arc<dyn ChatBackend>,
    policy: RetryPolicy,
}

impl RetryingBackend {
    /// Retry `inner` according to `policy`.
    pub fn new(inner: Arc<dyn ChatBackend>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl ChatBackend for RetryingBackend {
    async fn stream(&self, request: &ChatRequest) -> MaestroResult<ChatStream> {
        let mut attempt = 0;
        loop {
            match self.inner.stream(request).await {
                Ok(stream) => {
                    if attempt > 0 {
                        info!(attempt, "Model stream opened after retry");
                    }
                    return Ok(stream);
                }
                Err(e) if attempt < self.policy.max_retries && is_retryable(&e) => {
                    let delay = compute_backoff(&self.policy, attempt);
                    warn!(attempt, delay_ms = delay, error = %e, "Retrying model call");
                    tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

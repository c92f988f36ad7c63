//! Process-wide cap on concurrent model calls.

use crate::backends::{ChatBackend, ChatRequest, ChatStream};
use async_trait::async_trait;
use maestro_core::{MaestroError, MaestroResult};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tracing::debug;

/// Permits shared by every gated model call in the process.
pub const DEFAULT_CHAT_CONCURRENCY: usize = 2;

const FORWARD_CAPACITY: usize = 64;

/// Shared permit pool handed to every [`GatedBackend`].
pub fn chat_gate(permits: usize) -> Arc<Semaphore> {
    Arc::new(Semaphore::new(permits.max(1)))
}

/// Wraps a backend so each `stream()` holds one permit until its stream
/// ends.
///
/// Tool invocations happen after the executor has drained the stream, so a
/// tool that calls another gated agent never waits on a permit its own
/// caller is holding.
pub struct GatedBackend {
    inner: Arc<dyn ChatBackend>,
    gate: Arc<Semaphore>,
}

impl GatedBackend {
    /// Gate `inner` on the shared `gate`.
    pub fn new(inner: Arc<dyn ChatBackend>, gate: Arc<Semaphore>) -> Self {
        Self { inner, gate }
    }
}

#[async_trait]
impl ChatBackend for GatedBackend {
    async fn stream(&self, request: &ChatRequest) -> MaestroResult<ChatStream> {
        let permit = self
            .gate
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| MaestroError::Agent(format!("Model call gate closed: {e}")))?;
        let mut upstream = self.inner.stream(request).await?;

        let (tx, rx) = mpsc::channel(FORWARD_CAPACITY);
        tokio::spawn(async move {
            while let Some(update) = upstream.recv().await {
                if tx.send(update).await.is_err() {
                    debug!("Gated stream consumer dropped");
                    break;
                }
            }
            drop(permit);
        });
        Ok(rx)
    }
}

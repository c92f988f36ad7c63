//! Per-turn progress event bus.
//!
//! Many producers (specialist calls, delegation tools) push events through
//! cloned [`ProgressSender`]s; a single consumer reads them through the
//! [`ProgressReceiver`] with timed polls so it can interleave them with its
//! own model stream.

use crate::event::ProgressEvent;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Create a new bus for one turn.
pub fn progress_bus() -> (ProgressSender, ProgressReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        ProgressSender { tx },
        ProgressReceiver { rx, closed: false },
    )
}

/// Producer side of the bus.
#[derive(Debug, Clone)]
pub struct ProgressSender {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ProgressSender {
    /// Push an event. Events sent after the consumer is gone are discarded.
    pub fn emit(&self, event: ProgressEvent) {
        if self.tx.send(event).is_err() {
            debug!("progress bus closed, event discarded");
        }
    }
}

/// Consumer side of the bus.
#[derive(Debug)]
pub struct ProgressReceiver {
    rx: mpsc::UnboundedReceiver<ProgressEvent>,
    closed: bool,
}

impl ProgressReceiver {
    /// Wait up to `wait` for the next event.
    ///
    /// Returns `None` on timeout. Once every sender is dropped this sleeps for
    /// `wait` instead of returning immediately, so select loops do not spin.
    pub async fn poll(&mut self, wait: Duration) -> Option<ProgressEvent> {
        if self.closed {
            tokio::time::sleep(wait).await;
            return None;
        }
        match tokio::time::timeout(wait, self.rx.recv()).await {
            Ok(Some(event)) => Some(event),
            Ok(None) => {
                self.closed = true;
                None
            }
            Err(_) => None,
        }
    }

    /// Take every event that is already queued.
    pub fn drain(&mut self) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_poll_returns_events_in_emission_order() {
        let (tx, mut rx) = progress_bus();
        tx.emit(ProgressEvent::thinking("A", "one"));
        tx.emit(ProgressEvent::thinking("B", "two"));

        let first = rx.poll(Duration::from_millis(50)).await.unwrap();
        let second = rx.poll(Duration::from_millis(50)).await.unwrap();
        assert_eq!(first.content, "one");
        assert_eq!(second.content, "two");
    }

    #[tokio::test]
    async fn test_poll_times_out_when_idle() {
        let (_tx, mut rx) = progress_bus();
        assert!(rx.poll(Duration::from_millis(10)).await.is_none());
    }

    #[tokio::test]
    async fn test_drain_takes_everything_queued() {
        let (tx, mut rx) = progress_bus();
        let producer = tx.clone();
        for i in 0..5 {
            producer.emit(ProgressEvent::content("A", format!("{i}")));
        }
        let events = rx.drain();
        assert_eq!(events.len(), 5);
        assert!(rx.drain().is_empty());
        drop(tx);
    }

    #[tokio::test]
    async fn test_poll_after_close_sleeps_instead_of_spinning() {
        let (tx, mut rx) = progress_bus();
        drop(tx);
        assert!(rx.poll(Duration::from_millis(5)).await.is_none());
        let start = std::time::Instant::now();
        assert!(rx.poll(Duration::from_millis(20)).await.is_none());
        assert!(start.elapsed() >= Duration::from_millis(15));
    }
}

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::error::SourceError;
use crate::models::PositionSample;

#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    Sample(PositionSample),
    Failed(SourceError),
}

/// A source event stamped with the subscription it came from.
#[derive(Debug, Clone)]
pub struct SourceEnvelope {
    pub generation: u64,
    pub event: SourceEvent,
}

/// Callback side of a subscription, handed to a [`GeoSampleSource`](super::GeoSampleSource).
///
/// Delivery never blocks: when the engine queue is full the event is counted
/// as overflow and discarded. Once the subscription is cancelled every
/// delivery is refused.
#[derive(Debug, Clone)]
pub struct SampleSink {
    generation: u64,
    tx: mpsc::Sender<SourceEnvelope>,
    token: CancellationToken,
    overflow: Arc<AtomicU64>,
}

impl SampleSink {
    pub fn new(
        generation: u64,
        tx: mpsc::Sender<SourceEnvelope>,
        token: CancellationToken,
        overflow: Arc<AtomicU64>,
    ) -> Self {
        Self {
            generation,
            tx,
            token,
            overflow,
        }
    }

    /// Returns `false` if the fix was not queued.
    pub fn on_sample(&self, sample: PositionSample) -> bool {
        self.deliver(SourceEvent::Sample(sample))
    }

    pub fn on_error(&self, error: SourceError) -> bool {
        self.deliver(SourceEvent::Failed(error))
    }

    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled() || self.tx.is_closed()
    }

    /// Resolves once the subscription has been cancelled.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    /// Handle that cancels this sink.
    pub fn subscription(&self) -> Subscription {
        Subscription::new(self.token.clone())
    }

    fn deliver(&self, event: SourceEvent) -> bool {
        if self.token.is_cancelled() {
            return false;
        }

        let envelope = SourceEnvelope {
            generation: self.generation,
            event,
        };
        match self.tx.try_send(envelope) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.overflow.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

/// Unsubscribe handle. Cancelling is idempotent, and dropping the handle cancels.
#[derive(Debug)]
pub struct Subscription {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(token: CancellationToken) -> Self {
        Self { token, task: None }
    }

    /// Ties a producer task to this subscription so [`close`](Self::close) can join it.
    pub fn with_task(mut self, task: JoinHandle<()>) -> Self {
        self.task = Some(task);
        self
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancels and waits for the producer task, if any, to exit.
    pub async fn close(mut self) -> anyhow::Result<()> {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            task.await
                .map_err(|err| anyhow::anyhow!("source task failed to join: {err}"))?;
        }
        Ok(())
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

use std::sync::Arc;
use std::time::Duration;

use catalog_core::ChangeEvent;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::EventPublisher;
use crate::metrics;

/// Non-blocking handle used to hand change events to the background worker.
///
/// Cloning is cheap; every clone feeds the same queue. The worker stops once
/// every handle has been dropped and the queue has drained.
#[derive(Clone, Debug)]
pub struct EventDispatcher {
    tx: mpsc::Sender<ChangeEvent>,
}

/// Background half of the dispatcher. Run it with `tokio::spawn(worker.run())`.
pub struct EventWorker {
    rx: mpsc::Receiver<ChangeEvent>,
    publisher: Arc<dyn EventPublisher>,
    topic: String,
    publish_timeout: Duration,
}

impl EventDispatcher {
    /// Create a dispatcher with a queue of `capacity` events.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0 (rejected earlier by config validation).
    pub fn new(
        publisher: Arc<dyn EventPublisher>,
        topic: impl Into<String>,
        capacity: usize,
        publish_timeout: Duration,
    ) -> (Self, EventWorker) {
        let (tx, rx) = mpsc::channel(capacity);
        let worker = EventWorker {
            rx,
            publisher,
            topic: topic.into(),
            publish_timeout,
        };
        (Self { tx }, worker)
    }

    /// Create a dispatcher and spawn its worker on the current runtime.
    ///
    /// Keep the returned handle and [`EventWorkerHandle::drain`] it at
    /// shutdown, otherwise queued events die with the runtime.
    pub fn spawn(
        publisher: Arc<dyn EventPublisher>,
        topic: impl Into<String>,
        capacity: usize,
        publish_timeout: Duration,
    ) -> (Self, EventWorkerHandle) {
        let (dispatcher, worker) = Self::new(publisher, topic, capacity, publish_timeout);
        let handle = EventWorkerHandle {
            handle: tokio::spawn(worker.run()),
            drain_timeout: drain_timeout(publish_timeout, capacity),
        };
        (dispatcher, handle)
    }

    /// Queue an event. Never waits: a full queue drops the event.
    pub fn dispatch(&self, event: ChangeEvent) {
        let action = event.action().as_str();
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!(
                    action,
                    product_id = %event.product_id(),
                    "event queue full, dropping change event"
                );
                metrics::record_event_dropped(action);
            }
            Err(TrySendError::Closed(event)) => {
                warn!(
                    action,
                    product_id = %event.product_id(),
                    "event worker stopped, dropping change event"
                );
                metrics::record_event_dropped(action);
            }
        }
    }
}

/// Enough time to publish a full queue, capped.
fn drain_timeout(publish_timeout: Duration, capacity: usize) -> Duration {
    let capacity = u32::try_from(capacity).unwrap_or(u32::MAX);
    publish_timeout
        .saturating_mul(capacity)
        .min(EventWorkerHandle::MAX_DRAIN)
}

/// A spawned [`EventWorker`].
#[derive(Debug)]
pub struct EventWorkerHandle {
    handle: JoinHandle<()>,
    drain_timeout: Duration,
}

impl EventWorkerHandle {
    pub const MAX_DRAIN: Duration = Duration::from_secs(30);

    pub fn drain_timeout(&self) -> Duration {
        self.drain_timeout
    }

    /// Wait for the worker to publish what is still queued.
    ///
    /// The worker only finishes after every [`EventDispatcher`] clone has been
    /// dropped. Returns `false` if the drain bound elapsed first or the
    /// worker panicked.
    pub async fn drain(self) -> bool {
        match tokio::time::timeout(self.drain_timeout, self.handle).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!(error = %e, "event worker failed before draining");
                false
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.drain_timeout.as_millis() as u64,
                    "event queue not drained before shutdown, remaining events lost"
                );
                false
            }
        }
    }
}

impl EventWorker {
    /// Publish queued events one at a time until every dispatcher is dropped.
    pub async fn run(mut self) {
        info!(
            publisher = self.publisher.name(),
            topic = %self.topic,
            "event worker started"
        );
        while let Some(event) = self.rx.recv().await {
            self.publish_one(&event).await;
        }
        info!("event worker stopped");
    }

    async fn publish_one(&self, event: &ChangeEvent) {
        let action = event.action().as_str();
        let product_id = event.product_id();

        let payload = match event.to_payload() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(action, product_id = %product_id, error = %e, "failed to serialize change event");
                metrics::record_event_failed(action, "serialize");
                return;
            }
        };

        match tokio::time::timeout(
            self.publish_timeout,
            self.publisher.publish(&self.topic, &payload),
        )
        .await
        {
            Ok(Ok(())) => {
                debug!(action, product_id = %product_id, "change event published");
                metrics::record_event_published(action);
            }
            Ok(Err(e)) => {
                warn!(action, product_id = %product_id, error = %e, "failed to publish change event");
                metrics::record_event_failed(action, "error");
            }
            Err(_) => {
                warn!(
                    action,
                    product_id = %product_id,
                    timeout_ms = self.publish_timeout.as_millis() as u64,
                    "change event publish timed out"
                );
                metrics::record_event_failed(action, "timeout");
            }
        }
    }
}

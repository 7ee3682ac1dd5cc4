//! Change-event stream.
//!
//! After a mutation commits, the catalog service hands a [`ChangeEvent`] to
//! the [`EventDispatcher`]. A single background worker publishes it through
//! an [`EventPublisher`]:
//!
//! ```text
//! CatalogService ──try_send──▶ bounded queue ──▶ EventWorker ──publish──▶ broker
//! ```
//!
//! Delivery is best-effort: one attempt per event, failures are logged and
//! counted but never reach the request that caused them.
//!
//! [`ChangeEvent`]: catalog_core::ChangeEvent

mod dispatcher;
mod pubsub;

use async_trait::async_trait;

pub use dispatcher::{EventDispatcher, EventWorker, EventWorkerHandle};
pub use pubsub::{EventLogConsumer, RedisEventPublisher};

/// Errors that can occur while publishing a change event.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Broker pool error: {0}")]
    Pool(String),

    #[error("Broker connection error: {0}")]
    Connection(String),

    #[error("Broker publish error: {0}")]
    Publish(String),

    #[error("Broker subscribe error: {0}")]
    Subscribe(String),

    #[error("Broker message error: {0}")]
    Message(String),

    #[error("Broker stream ended")]
    StreamEnded,
}

/// Producer side of the message broker.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Send one payload to `topic`.
    async fn publish(&self, topic: &str, payload: &str) -> Result<(), PublishError>;

    fn name(&self) -> &'static str;
}

/// Publisher used when the change stream is disabled. Accepts and discards.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(&self, topic: &str, _payload: &str) -> Result<(), PublishError> {
        tracing::trace!(topic, "change stream disabled, event discarded");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_accepts_everything() {
        let publisher = NoopEventPublisher;
        assert!(publisher.publish("product-events", "{}").await.is_ok());
        assert_eq!(publisher.name(), "noop");
    }
}

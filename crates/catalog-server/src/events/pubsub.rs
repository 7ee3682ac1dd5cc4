//! Redis pub/sub as the change-event broker.
//!
//! Events are sent with `PUBLISH <topic> <json>`. Subscribers (for example
//! [`EventLogConsumer`]) receive every event published while they are
//! connected; nothing is retained for late subscribers.

use std::convert::Infallible;
use std::time::Duration;

use async_trait::async_trait;
use catalog_core::ChangeEvent;
use deadpool_redis::{Pool, redis::AsyncCommands};
use futures_util::StreamExt;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::{EventPublisher, PublishError};
use crate::cache::backend::create_redis_pool;

/// Publishes change events on a pooled Redis connection.
#[derive(Clone)]
pub struct RedisEventPublisher {
    pool: Pool,
}

impl RedisEventPublisher {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create a publisher with its own pool for `broker_url`.
    ///
    /// No connection is made until the first publish.
    pub fn connect(
        broker_url: &str,
        pool_size: usize,
        timeout_ms: u64,
    ) -> Result<Self, PublishError> {
        let pool = create_redis_pool(broker_url, pool_size, timeout_ms)
            .map_err(|e| PublishError::Pool(e.to_string()))?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl EventPublisher for RedisEventPublisher {
    async fn publish(&self, topic: &str, payload: &str) -> Result<(), PublishError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| PublishError::Pool(e.to_string()))?;

        let receivers = conn
            .publish::<_, _, i64>(topic, payload)
            .await
            .map_err(|e| PublishError::Publish(e.to_string()))?;

        debug!(topic, receivers, "Published change event to Redis");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

/// Subscribes to the change-event topic and logs every event received.
///
/// # Example
///
/// ```ignore
/// let consumer = EventLogConsumer::new("redis://localhost:6379", "product-events");
/// tokio::spawn(consumer.run());
/// ```
pub struct EventLogConsumer {
    broker_url: String,
    topic: String,
}

impl EventLogConsumer {
    const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
    const MAX_BACKOFF: Duration = Duration::from_secs(300);

    pub fn new(broker_url: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            broker_url: broker_url.into(),
            topic: topic.into(),
        }
    }

    /// Consume forever, reconnecting with exponential backoff.
    pub async fn run(self) {
        info!(topic = %self.topic, "Starting change event log consumer");

        let mut backoff = Self::INITIAL_BACKOFF;
        loop {
            let Err(e) = self.subscribe_loop(&mut backoff).await;
            error!(
                error = %e,
                backoff_secs = backoff.as_secs(),
                "Change event log consumer error, reconnecting..."
            );
            sleep(backoff).await;
            backoff = (backoff * 2).min(Self::MAX_BACKOFF);
        }
    }

    /// Subscribe and log until the connection fails.
    async fn subscribe_loop(&self, backoff: &mut Duration) -> Result<Infallible, PublishError> {
        use deadpool_redis::redis::Client;

        // Pooled connections cannot SUBSCRIBE
        let client = Client::open(self.broker_url.as_str())
            .map_err(|e| PublishError::Connection(e.to_string()))?;

        let mut pubsub = client
            .get_async_pubsub()
            .await
            .map_err(|e| PublishError::Connection(e.to_string()))?;

        pubsub
            .subscribe(&self.topic)
            .await
            .map_err(|e| PublishError::Subscribe(e.to_string()))?;

        info!(topic = %self.topic, "Subscribed to change event topic");
        *backoff = Self::INITIAL_BACKOFF;

        let mut stream = pubsub.on_message();
        while let Some(msg) = stream.next().await {
            let payload: String = msg
                .get_payload()
                .map_err(|e: deadpool_redis::redis::RedisError| {
                    PublishError::Message(e.to_string())
                })?;
            log_event(&self.topic, &payload);
        }

        warn!("Redis pub/sub stream ended");
        Err(PublishError::StreamEnded)
    }
}

fn log_event(topic: &str, payload: &str) {
    match ChangeEvent::from_payload(payload) {
        Ok(event) => info!(
            topic,
            action = %event.action(),
            product_id = %event.product_id(),
            value = %payload,
            "Received change event"
        ),
        Err(e) => warn!(
            topic,
            error = %e,
            payload = %payload,
            "Failed to deserialize change event"
        ),
    }
}

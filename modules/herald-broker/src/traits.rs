use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

/// A message handed to a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: String,
    pub body: Vec<u8>,
}

/// Where an acknowledged message landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordMetadata {
    pub partition: i32,
    pub offset: i64,
}

/// Entry point: opens producer sessions and group subscriptions.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Open a producer session. Fails if the broker cannot be reached.
    async fn connect(&self) -> Result<Arc<dyn Producer>>;

    /// Join `group` as a consumer of `topic`.
    async fn subscribe(&self, topic: &str, group: &str) -> Result<Box<dyn Subscription>>;
}

#[async_trait]
pub trait Producer: Send + Sync {
    /// Append `body` to `topic`. Resolves once the broker has durably accepted it.
    async fn publish(&self, topic: &str, key: &str, body: &[u8]) -> Result<RecordMetadata>;

    /// Tear the session down. Later publishes fail with `BrokerError::Closed`.
    async fn close(&self);
}

#[async_trait]
pub trait Subscription: Send {
    /// Commit the previously returned delivery, then wait for the next one.
    ///
    /// Returns `Ok(None)` once the subscription is closed.
    async fn next(&mut self) -> Result<Option<Delivery>>;

    /// Commit what has been advanced past and give up partition ownership.
    async fn close(&mut self) -> Result<()>;
}

#[async_trait]
impl<B: Broker + ?Sized> Broker for Arc<B> {
    async fn connect(&self) -> Result<Arc<dyn Producer>> {
        (**self).connect().await
    }

    async fn subscribe(&self, topic: &str, group: &str) -> Result<Box<dyn Subscription>> {
        (**self).subscribe(topic, group).await
    }
}

//! Event Sender: publish an event, then record it as SENT.
//!
//! The producer session is opened on first use and kept. A failed publish
//! closes and drops it, so the next `send` starts from a fresh `connect`.

use std::sync::Arc;

use herald_broker::{Broker, BrokerError, Producer};
use herald_common::{EventMessage, EventType, Payload};
use herald_events::{EventLogStore, StoreError};
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("Broker connection failed: {0}")]
    Connect(#[source] BrokerError),

    #[error("Event {id} was not delivered: {source}")]
    Delivery {
        id: Uuid,
        #[source]
        source: BrokerError,
    },

    #[error("Event could not be serialized: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Published, but the SENT row was not written. The message is on the
    /// topic and will be processed; the processor's upsert creates the row.
    #[error("Event {id} was published but not logged: {source}")]
    NotLogged {
        id: Uuid,
        #[source]
        source: StoreError,
    },
}

pub struct EventSender {
    broker: Arc<dyn Broker>,
    log: Arc<dyn EventLogStore>,
    topic: String,
    producer: Mutex<Option<Arc<dyn Producer>>>,
}

impl EventSender {
    pub fn new(
        broker: Arc<dyn Broker>,
        log: Arc<dyn EventLogStore>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            broker,
            log,
            topic: topic.into(),
            producer: Mutex::new(None),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Publish one event and write its SENT row. Returns the event id.
    ///
    /// Waits for the broker's acknowledgement. Does not retry.
    pub async fn send(&self, event_type: EventType, payload: Payload) -> Result<Uuid, SendError> {
        let message = EventMessage::new(event_type, payload);
        let body = message.to_json_bytes()?;

        let producer = self.producer().await?;
        let key = message.id.to_string();

        match producer.publish(&self.topic, &key, &body).await {
            Ok(meta) => {
                info!(
                    event_id = %message.id,
                    event_type = %message.event_type,
                    partition = meta.partition,
                    offset = meta.offset,
                    "Event published"
                );
            }
            Err(source) => {
                warn!(
                    event_id = %message.id,
                    error = %source,
                    "Publish failed, resetting producer"
                );
                self.reset(&producer).await;
                return Err(SendError::Delivery {
                    id: message.id,
                    source,
                });
            }
        }

        if let Err(source) = self.log.record_sent(&message).await {
            error!(
                event_id = %message.id,
                error = %source,
                "Event published but SENT row not written"
            );
            return Err(SendError::NotLogged {
                id: message.id,
                source,
            });
        }

        Ok(message.id)
    }

    /// Close the cached producer, if any.
    pub async fn close(&self) {
        if let Some(producer) = self.producer.lock().await.take() {
            producer.close().await;
        }
    }

    async fn producer(&self) -> Result<Arc<dyn Producer>, SendError> {
        let mut slot = self.producer.lock().await;
        if let Some(producer) = slot.as_ref() {
            return Ok(Arc::clone(producer));
        }

        let producer = self.broker.connect().await.map_err(SendError::Connect)?;
        info!(topic = %self.topic, "Producer connected");
        *slot = Some(Arc::clone(&producer));
        Ok(producer)
    }

    /// Drop `failed` from the cache unless another call already replaced it.
    async fn reset(&self, failed: &Arc<dyn Producer>) {
        let mut slot = self.producer.lock().await;
        if slot.as_ref().is_some_and(|current| Arc::ptr_eq(current, failed)) {
            *slot = None;
        }
        drop(slot);
        failed.close().await;
    }
}

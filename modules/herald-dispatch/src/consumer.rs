//! Event Consumer: one cooperative loop per process.
//!
//! Joins the consumer group, decodes each delivery and hands it to the
//! processor, strictly one at a time. A bad message (malformed body, panicking
//! action) is logged and skipped; it never stops the loop. The broker commits a
//! delivery once the loop asks for the next one.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use herald_broker::{Broker, BrokerError, Delivery};
use herald_common::EventMessage;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::processor::{EventProcessor, ProcessOutcome};

#[derive(Debug, thiserror::Error)]
pub enum ConsumerError {
    #[error("Failed to subscribe to {topic} as {group}: {source}")]
    Subscribe {
        topic: String,
        group: String,
        #[source]
        source: BrokerError,
    },

    #[error("Broker error while consuming: {0}")]
    Receive(#[source] BrokerError),
}

/// Counters for one `start_consuming` run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerStats {
    pub succeeded: u64,
    pub failed: u64,
    pub malformed: u64,
}

pub struct EventConsumer {
    broker: Arc<dyn Broker>,
    processor: Arc<EventProcessor>,
    topic: String,
    group: String,
    running: AtomicBool,
    shutdown: watch::Sender<bool>,
}

impl EventConsumer {
    pub fn new(
        broker: Arc<dyn Broker>,
        processor: Arc<EventProcessor>,
        topic: impl Into<String>,
        group: impl Into<String>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            broker,
            processor,
            topic: topic.into(),
            group: group.into(),
            running: AtomicBool::new(false),
            shutdown,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Consume until `stop()` is called or the subscription ends.
    ///
    /// A pending wait for the next message is interrupted by `stop()`; an
    /// event already being processed runs to completion first.
    /// A `stop()` that arrives while the subscription is still being set up
    /// ends the run before any message is read.
    pub async fn start_consuming(&self) -> Result<ConsumerStats, ConsumerError> {
        self.shutdown.send_replace(false);
        self.running.store(true, Ordering::SeqCst);
        let mut stop_rx = self.shutdown.subscribe();

        let mut subscription = match self.broker.subscribe(&self.topic, &self.group).await {
            Ok(subscription) => subscription,
            Err(source) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(ConsumerError::Subscribe {
                    topic: self.topic.clone(),
                    group: self.group.clone(),
                    source,
                });
            }
        };
        let mut stats = ConsumerStats::default();

        info!(topic = %self.topic, group = %self.group, "Consumer started");

        let result = loop {
            if !self.is_running() {
                break Ok(());
            }

            let next = tokio::select! {
                biased;
                _ = stop_requested(&mut stop_rx) => break Ok(()),
                next = subscription.next() => next,
            };

            match next {
                Ok(Some(delivery)) => self.handle(&delivery, &mut stats).await,
                Ok(None) => {
                    info!("Subscription ended");
                    break Ok(());
                }
                Err(e) => {
                    error!(error = %e, "Broker error, stopping consumer");
                    break Err(ConsumerError::Receive(e));
                }
            }
        };

        if let Err(e) = subscription.close().await {
            warn!(error = %e, "Failed to close subscription cleanly");
        }
        self.running.store(false, Ordering::SeqCst);

        info!(
            succeeded = stats.succeeded,
            failed = stats.failed,
            malformed = stats.malformed,
            "Consumer stopped"
        );
        result.map(|()| stats)
    }

    /// Ask the loop to exit at its next iteration boundary.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!(topic = %self.topic, group = %self.group, "Stopping consumer");
        }
        self.shutdown.send_replace(true);
    }

    async fn handle(&self, delivery: &Delivery, stats: &mut ConsumerStats) {
        let message = match EventMessage::from_json_slice(&delivery.body) {
            Ok(message) => message,
            Err(e) => {
                warn!(
                    partition = delivery.partition,
                    offset = delivery.offset,
                    error = %e,
                    "Skipping malformed event message"
                );
                stats.malformed += 1;
                return;
            }
        };

        let processed = AssertUnwindSafe(self.processor.process_event(&message))
            .catch_unwind()
            .await;

        match processed {
            Ok(ProcessOutcome::Succeeded { .. }) => stats.succeeded += 1,
            Ok(ProcessOutcome::Failed { .. }) => stats.failed += 1,
            Err(_) => {
                error!(
                    event_id = %message.id,
                    offset = delivery.offset,
                    "Event processing panicked, skipping message"
                );
                stats.failed += 1;
            }
        }
    }
}

/// Resolves once `stop()` has been called.
async fn stop_requested(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

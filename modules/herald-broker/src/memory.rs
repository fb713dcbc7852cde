//! In-process broker with the same group semantics as `PgBroker`, on a single
//! partition. Supports failure injection for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::error::{BrokerError, Result};
use crate::traits::{Broker, Delivery, Producer, RecordMetadata, Subscription};

#[derive(Clone)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<State>,
    /// Bumped on every publish, commit and ownership change.
    activity: watch::Sender<u64>,
    next_member: AtomicU64,
    fail_connects: AtomicUsize,
    fail_publishes: AtomicUsize,
    /// Milliseconds between appending a message and acknowledging it.
    ack_delay_ms: AtomicU64,
    connects: AtomicUsize,
}

#[derive(Default)]
struct State {
    /// topic -> (key, body); offset = index + 1
    topics: HashMap<String, Vec<(String, Vec<u8>)>>,
    /// (group, topic) -> committed offset
    committed: HashMap<(String, String), i64>,
    /// (group, topic) -> member currently owning the partition
    owners: HashMap<(String, String), u64>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        let (activity, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                activity,
                next_member: AtomicU64::new(1),
                fail_connects: AtomicUsize::new(0),
                fail_publishes: AtomicUsize::new(0),
                ack_delay_ms: AtomicU64::new(0),
                connects: AtomicUsize::new(0),
            }),
        }
    }

    /// The next `n` calls to `connect` fail.
    pub fn fail_next_connects(&self, n: usize) {
        self.inner.fail_connects.store(n, Ordering::SeqCst);
    }

    /// The next `n` publishes fail after the producer accepted the call.
    pub fn fail_next_publishes(&self, n: usize) {
        self.inner.fail_publishes.store(n, Ordering::SeqCst);
    }

    /// Hold every publish acknowledgement back by `delay` after the message is
    /// already visible to subscribers.
    pub fn delay_publish_acks(&self, delay: Duration) {
        self.inner
            .ack_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// How many producer sessions have been opened.
    pub fn connect_count(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    /// Bodies appended to `topic`, in offset order.
    pub fn messages(&self, topic: &str) -> Vec<Vec<u8>> {
        let state = self.inner.state.lock().unwrap();
        state
            .topics
            .get(topic)
            .map(|msgs| msgs.iter().map(|(_, body)| body.clone()).collect())
            .unwrap_or_default()
    }

    /// Committed offset for a group, 0 if it never committed.
    pub fn committed_offset(&self, topic: &str, group: &str) -> i64 {
        let state = self.inner.state.lock().unwrap();
        state
            .committed
            .get(&(group.to_string(), topic.to_string()))
            .copied()
            .unwrap_or(0)
    }

    fn bump(&self) {
        self.inner.activity.send_modify(|v| *v = v.wrapping_add(1));
    }

    fn append(&self, topic: &str, key: &str, body: &[u8]) -> RecordMetadata {
        let offset = {
            let mut state = self.inner.state.lock().unwrap();
            let log = state.topics.entry(topic.to_string()).or_default();
            log.push((key.to_string(), body.to_vec()));
            log.len() as i64
        };
        self.bump();
        RecordMetadata {
            partition: 0,
            offset,
        }
    }
}

/// Decrement `counter` if positive; true when a failure should be injected.
fn take_failure(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn connect(&self) -> Result<Arc<dyn Producer>> {
        if take_failure(&self.inner.fail_connects) {
            return Err(BrokerError::Unavailable("injected connect failure".into()));
        }
        self.inner.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MemoryProducer {
            broker: self.clone(),
            closed: AtomicBool::new(false),
        }))
    }

    async fn subscribe(&self, topic: &str, group: &str) -> Result<Box<dyn Subscription>> {
        Ok(Box::new(MemorySubscription {
            broker: self.clone(),
            member: self.inner.next_member.fetch_add(1, Ordering::SeqCst),
            key: (group.to_string(), topic.to_string()),
            activity: self.inner.activity.subscribe(),
            cursor: None,
            pending: None,
            closed: false,
        }))
    }
}

// ---------------------------------------------------------------------------
// Producer
// ---------------------------------------------------------------------------

struct MemoryProducer {
    broker: MemoryBroker,
    closed: AtomicBool,
}

#[async_trait]
impl Producer for MemoryProducer {
    async fn publish(&self, topic: &str, key: &str, body: &[u8]) -> Result<RecordMetadata> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::Closed);
        }
        if take_failure(&self.broker.inner.fail_publishes) {
            return Err(BrokerError::Unavailable("injected publish failure".into()));
        }
        let meta = self.broker.append(topic, key, body);

        let delay = self.broker.inner.ack_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        Ok(meta)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

struct MemorySubscription {
    broker: MemoryBroker,
    member: u64,
    key: (String, String),
    activity: watch::Receiver<u64>,
    /// Last offset handed out; `None` until this member owns the partition.
    cursor: Option<i64>,
    pending: Option<i64>,
    closed: bool,
}

impl MemorySubscription {
    fn commit_pending(&mut self, state: &mut State) {
        if let Some(offset) = self.pending.take() {
            state.committed.insert(self.key.clone(), offset);
        }
    }

    fn release(&mut self) {
        let mut state = self.broker.inner.state.lock().unwrap();
        if state.owners.get(&self.key) == Some(&self.member) {
            state.owners.remove(&self.key);
        }
        drop(state);
        self.cursor = None;
        self.broker.bump();
    }

    fn poll(&mut self) -> Option<Delivery> {
        let inner = Arc::clone(&self.broker.inner);
        let mut state = inner.state.lock().unwrap();
        self.commit_pending(&mut state);

        let owner = *state.owners.entry(self.key.clone()).or_insert(self.member);
        if owner != self.member {
            return None;
        }

        let cursor = match self.cursor {
            Some(c) => c,
            None => {
                let committed = state.committed.get(&self.key).copied().unwrap_or(0);
                self.cursor = Some(committed);
                committed
            }
        };

        let topic = &self.key.1;
        let (key, body) = state.topics.get(topic)?.get(cursor as usize)?.clone();
        let offset = cursor + 1;

        self.cursor = Some(offset);
        self.pending = Some(offset);

        Some(Delivery {
            topic: topic.clone(),
            partition: 0,
            offset,
            key,
            body,
        })
    }
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn next(&mut self) -> Result<Option<Delivery>> {
        loop {
            if self.closed {
                return Ok(None);
            }

            self.activity.borrow_and_update();
            if let Some(delivery) = self.poll() {
                return Ok(Some(delivery));
            }

            if self.activity.changed().await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        {
            let inner = Arc::clone(&self.broker.inner);
            let mut state = inner.state.lock().unwrap();
            self.commit_pending(&mut state);
        }
        self.closed = true;
        self.release();
        Ok(())
    }
}

impl Drop for MemorySubscription {
    // A dropped subscription behaves like a crashed member: ownership is
    // released and the uncommitted delivery is redelivered to the next owner.
    fn drop(&mut self) {
        if !self.closed {
            self.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn publish(broker: &MemoryBroker, body: &str) {
        let producer = broker.connect().await.unwrap();
        producer.publish("events", "k", body.as_bytes()).await.unwrap();
    }

    #[tokio::test]
    async fn delivers_in_publish_order_and_commits_on_advance() {
        let broker = MemoryBroker::new();
        publish(&broker, "one").await;
        publish(&broker, "two").await;

        let mut sub = broker.subscribe("events", "g").await.unwrap();
        let first = sub.next().await.unwrap().unwrap();
        assert_eq!(first.body, b"one");
        assert_eq!(broker.committed_offset("events", "g"), 0);

        let second = sub.next().await.unwrap().unwrap();
        assert_eq!(second.body, b"two");
        assert_eq!(broker.committed_offset("events", "g"), 1);

        sub.close().await.unwrap();
        assert_eq!(broker.committed_offset("events", "g"), 2);
        assert!(sub.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn dropped_member_leaves_message_for_redelivery() {
        let broker = MemoryBroker::new();
        publish(&broker, "only").await;

        let mut crashed = broker.subscribe("events", "g").await.unwrap();
        assert_eq!(crashed.next().await.unwrap().unwrap().body, b"only");
        drop(crashed);

        let mut survivor = broker.subscribe("events", "g").await.unwrap();
        let redelivered = survivor.next().await.unwrap().unwrap();
        assert_eq!(redelivered.body, b"only");
        assert_eq!(redelivered.offset, 1);
    }

    #[tokio::test]
    async fn second_member_of_a_group_waits_for_ownership() {
        let broker = MemoryBroker::new();
        publish(&broker, "a").await;

        let mut owner = broker.subscribe("events", "g").await.unwrap();
        let mut standby = broker.subscribe("events", "g").await.unwrap();
        assert_eq!(owner.next().await.unwrap().unwrap().body, b"a");

        let waiting = tokio::time::timeout(Duration::from_millis(50), standby.next()).await;
        assert!(waiting.is_err(), "standby must not receive while owner is alive");

        publish(&broker, "b").await;
        owner.close().await.unwrap();

        let taken_over = standby.next().await.unwrap().unwrap();
        assert_eq!(taken_over.body, b"b");
    }

    #[tokio::test]
    async fn groups_consume_independently() {
        let broker = MemoryBroker::new();
        publish(&broker, "x").await;

        let mut g1 = broker.subscribe("events", "g1").await.unwrap();
        let mut g2 = broker.subscribe("events", "g2").await.unwrap();

        assert_eq!(g1.next().await.unwrap().unwrap().body, b"x");
        assert_eq!(g2.next().await.unwrap().unwrap().body, b"x");
    }

    #[tokio::test]
    async fn injected_failures_are_consumed_one_by_one() {
        let broker = MemoryBroker::new();
        broker.fail_next_connects(1);
        assert!(broker.connect().await.is_err());

        let producer = broker.connect().await.unwrap();
        broker.fail_next_publishes(1);
        assert!(producer.publish("events", "k", b"1").await.is_err());
        assert!(producer.publish("events", "k", b"2").await.is_ok());
        assert_eq!(broker.messages("events"), vec![b"2".to_vec()]);
        assert_eq!(broker.connect_count(), 1);
    }

    #[tokio::test]
    async fn delayed_ack_message_is_readable_before_publish_returns() {
        let broker = MemoryBroker::new();
        broker.delay_publish_acks(Duration::from_millis(100));
        let producer = broker.connect().await.unwrap();

        let publish = tokio::spawn(async move { producer.publish("events", "k", b"early").await });

        let mut sub = broker.subscribe("events", "g").await.unwrap();
        let delivery = tokio::time::timeout(Duration::from_millis(50), sub.next())
            .await
            .expect("message was not visible before the ack")
            .unwrap()
            .unwrap();
        assert_eq!(delivery.body, b"early");
        assert!(!publish.is_finished());

        assert_eq!(publish.await.unwrap().unwrap().offset, 1);
    }

    #[tokio::test]
    async fn closed_producer_rejects_publish() {
        let broker = MemoryBroker::new();
        let producer = broker.connect().await.unwrap();
        producer.close().await;
        assert!(matches!(
            producer.publish("events", "k", b"x").await,
            Err(BrokerError::Closed)
        ));
    }
}

//! Postgres-backed broker.
//!
//! Messages live in `broker_messages`, group progress in `broker_offsets`.
//! Partition ownership is a session-level advisory lock held on a connection
//! detached from the pool, so it disappears with the process: whoever claims
//! the partition next resumes from the last committed offset.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgConnection, PgListener};
use sqlx::PgPool;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{BrokerError, Result};
use crate::traits::{Broker, Delivery, Producer, RecordMetadata, Subscription};

/// Advisory-lock namespaces (first key of the two-key form).
const PUBLISH_LOCK_NS: i32 = 0x4842_0001;
const OWNERSHIP_LOCK_NS: i32 = 0x4842_0002;

#[derive(Debug, Clone)]
pub struct PgBrokerOptions {
    pub partitions: u32,
    /// Upper bound on how long an idle subscription waits before re-polling.
    pub poll_interval: Duration,
}

impl Default for PgBrokerOptions {
    fn default() -> Self {
        Self {
            partitions: 1,
            poll_interval: Duration::from_millis(500),
        }
    }
}

#[derive(Clone)]
pub struct PgBroker {
    pool: PgPool,
    options: PgBrokerOptions,
}

impl PgBroker {
    pub fn new(pool: PgPool, options: PgBrokerOptions) -> Self {
        let options = PgBrokerOptions {
            partitions: options.partitions.max(1),
            ..options
        };
        Self { pool, options }
    }
}

#[async_trait]
impl Broker for PgBroker {
    async fn connect(&self) -> Result<Arc<dyn Producer>> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| BrokerError::Unavailable(e.to_string()))?;

        Ok(Arc::new(PgProducer {
            pool: self.pool.clone(),
            partitions: self.options.partitions,
            closed: AtomicBool::new(false),
        }))
    }

    async fn subscribe(&self, topic: &str, group: &str) -> Result<Box<dyn Subscription>> {
        let session = self
            .pool
            .acquire()
            .await
            .map_err(|e| BrokerError::Unavailable(e.to_string()))?
            .detach();

        let listener = match PgListener::connect_with(&self.pool).await {
            Ok(mut listener) => match listener.listen(&notify_channel(topic)).await {
                Ok(()) => Some(listener),
                Err(e) => {
                    warn!(error = %e, topic, "LISTEN failed, falling back to polling");
                    None
                }
            },
            Err(e) => {
                warn!(error = %e, topic, "Listener connection failed, falling back to polling");
                None
            }
        };

        info!(topic, group, partitions = self.options.partitions, "Subscribed");

        Ok(Box::new(PgSubscription {
            pool: self.pool.clone(),
            session: Some(session),
            listener,
            topic: topic.to_string(),
            group: group.to_string(),
            partitions: self.options.partitions,
            poll_interval: self.options.poll_interval,
            owned: Vec::new(),
            cursors: HashMap::new(),
            pending: None,
            next_slot: 0,
        }))
    }
}

/// Partition for a message key: UUID keys spread across partitions, anything
/// else lands on partition 0.
pub fn partition_for(key: &str, partitions: u32) -> i32 {
    match Uuid::parse_str(key) {
        Ok(id) => (id.as_u128() % u128::from(partitions.max(1))) as i32,
        Err(_) => 0,
    }
}

fn notify_channel(topic: &str) -> String {
    format!("broker:{topic}")
}

// ---------------------------------------------------------------------------
// Producer
// ---------------------------------------------------------------------------

struct PgProducer {
    pool: PgPool,
    partitions: u32,
    closed: AtomicBool,
}

#[async_trait]
impl Producer for PgProducer {
    async fn publish(&self, topic: &str, key: &str, body: &[u8]) -> Result<RecordMetadata> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::Closed);
        }

        let partition = partition_for(key, self.partitions);
        let mut tx = self.pool.begin().await?;

        // Serialize appends per partition so offsets become visible in order.
        sqlx::query("SELECT pg_advisory_xact_lock($1, hashtext($2))")
            .bind(PUBLISH_LOCK_NS)
            .bind(format!("{topic}/{partition}"))
            .execute(&mut *tx)
            .await?;

        let (offset,) = sqlx::query_as::<_, (i64,)>(
            r#"
            INSERT INTO broker_messages (topic, partition, key, body)
            VALUES ($1, $2, $3, $4)
            RETURNING message_offset
            "#,
        )
        .bind(topic)
        .bind(partition)
        .bind(key)
        .bind(body)
        .fetch_one(&mut *tx)
        .await?;

        // Delivered at commit; a nudge for idle subscribers, not a guarantee.
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(notify_channel(topic))
            .bind(format!("{partition}:{offset}"))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(RecordMetadata { partition, offset })
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

struct PgSubscription {
    pool: PgPool,
    /// Holds the partition ownership locks. `None` once closed.
    session: Option<PgConnection>,
    listener: Option<PgListener>,
    topic: String,
    group: String,
    partitions: u32,
    poll_interval: Duration,
    owned: Vec<i32>,
    /// Offset of the last message handed out, per owned partition.
    cursors: HashMap<i32, i64>,
    /// Last delivery, committed when the consumer asks for the next one.
    pending: Option<(i32, i64)>,
    next_slot: usize,
}

impl PgSubscription {
    async fn commit_pending(&mut self) -> Result<()> {
        let Some((partition, offset)) = self.pending else {
            return Ok(());
        };

        sqlx::query(
            r#"
            INSERT INTO broker_offsets (group_id, topic, partition, committed_offset)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (group_id, topic, partition) DO UPDATE
            SET committed_offset = EXCLUDED.committed_offset,
                updated_at = now()
            "#,
        )
        .bind(&self.group)
        .bind(&self.topic)
        .bind(partition)
        .bind(offset)
        .execute(&self.pool)
        .await?;

        self.pending = None;
        Ok(())
    }

    /// Try to take ownership of every partition nobody in the group holds.
    async fn claim_partitions(&mut self) -> Result<()> {
        if self.owned.len() as u32 >= self.partitions {
            return Ok(());
        }
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };

        for partition in 0..self.partitions as i32 {
            if self.owned.contains(&partition) {
                continue;
            }

            let (acquired,) = sqlx::query_as::<_, (bool,)>(
                "SELECT pg_try_advisory_lock($1, hashtext($2))",
            )
            .bind(OWNERSHIP_LOCK_NS)
            .bind(format!("{}/{}/{}", self.group, self.topic, partition))
            .fetch_one(&mut *session)
            .await?;

            if !acquired {
                continue;
            }

            let committed = sqlx::query_as::<_, (i64,)>(
                r#"
                SELECT committed_offset FROM broker_offsets
                WHERE group_id = $1 AND topic = $2 AND partition = $3
                "#,
            )
            .bind(&self.group)
            .bind(&self.topic)
            .bind(partition)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| row.0)
            .unwrap_or(0);

            info!(
                topic = %self.topic,
                group = %self.group,
                partition,
                committed,
                "Claimed partition"
            );
            self.owned.push(partition);
            self.cursors.insert(partition, committed);
        }

        Ok(())
    }

    /// Next unread message across owned partitions, round-robin.
    async fn fetch_next(&mut self) -> Result<Option<Delivery>> {
        for _ in 0..self.owned.len() {
            let slot = self.next_slot % self.owned.len();
            self.next_slot = self.next_slot.wrapping_add(1);
            let partition = self.owned[slot];
            let cursor = self.cursors.get(&partition).copied().unwrap_or(0);

            let row = sqlx::query_as::<_, (i64, String, Vec<u8>)>(
                r#"
                SELECT message_offset, key, body
                FROM broker_messages
                WHERE topic = $1 AND partition = $2 AND message_offset > $3
                ORDER BY message_offset ASC
                LIMIT 1
                "#,
            )
            .bind(&self.topic)
            .bind(partition)
            .bind(cursor)
            .fetch_optional(&self.pool)
            .await?;

            if let Some((offset, key, body)) = row {
                self.cursors.insert(partition, offset);
                self.pending = Some((partition, offset));
                return Ok(Some(Delivery {
                    topic: self.topic.clone(),
                    partition,
                    offset,
                    key,
                    body,
                }));
            }
        }

        Ok(None)
    }

    async fn wait_for_activity(&mut self) {
        let Some(listener) = self.listener.as_mut() else {
            tokio::time::sleep(self.poll_interval).await;
            return;
        };

        match tokio::time::timeout(self.poll_interval, listener.recv()).await {
            Ok(Ok(notification)) => {
                debug!(payload = notification.payload(), "Broker notification");
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Listener failed, falling back to polling");
                self.listener = None;
            }
            Err(_) => {}
        }
    }
}

#[async_trait]
impl Subscription for PgSubscription {
    async fn next(&mut self) -> Result<Option<Delivery>> {
        self.commit_pending().await?;

        loop {
            if self.session.is_none() {
                return Ok(None);
            }

            self.claim_partitions().await?;

            if let Some(delivery) = self.fetch_next().await? {
                return Ok(Some(delivery));
            }

            self.wait_for_activity().await;
        }
    }

    async fn close(&mut self) -> Result<()> {
        let committed = self.commit_pending().await;

        if let Some(mut session) = self.session.take() {
            if let Err(e) = sqlx::query("SELECT pg_advisory_unlock_all()")
                .execute(&mut session)
                .await
            {
                warn!(error = %e, "Failed to release partition locks; they drop with the session");
            }
            if let Err(e) = sqlx::Connection::close(session).await {
                warn!(error = %e, "Failed to close broker session");
            }
        }
        self.listener = None;
        self.owned.clear();

        info!(topic = %self.topic, group = %self.group, "Subscription closed");
        committed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_keys_spread_over_partitions() {
        let id = Uuid::from_u128(7);
        assert_eq!(partition_for(&id.to_string(), 4), 3);
        assert_eq!(partition_for(&id.to_string(), 1), 0);
    }

    #[test]
    fn non_uuid_keys_land_on_partition_zero() {
        assert_eq!(partition_for("user-42", 8), 0);
    }

    #[test]
    fn zero_partitions_is_treated_as_one() {
        let id = Uuid::from_u128(5);
        assert_eq!(partition_for(&id.to_string(), 0), 0);
    }
}

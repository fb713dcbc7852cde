//! Event log: the durable per-event state machine.
//!
//! The sender inserts the `sent` row; the processor moves it forward. State
//! writes are upserts so a redelivered message overwrites the previous outcome
//! instead of adding a second row. The `sent` insert never overwrites: the
//! consumer may have written the row before the publish ack came back.

use std::sync::Arc;

use async_trait::async_trait;
use herald_common::{EventMessage, EventProcessingState};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;
use crate::types::EventLogEntry;

#[async_trait]
pub trait EventLogStore: Send + Sync {
    /// Insert the initial `sent` row for a freshly published message.
    ///
    /// A row that already exists is left untouched and counts as logged.
    async fn record_sent(&self, message: &EventMessage) -> Result<()>;

    /// Set the state of a message's row, creating it if the `sent` row is missing.
    async fn transition(
        &self,
        message: &EventMessage,
        state: EventProcessingState,
        error: Option<&str>,
    ) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<EventLogEntry>>;
}

// ---------------------------------------------------------------------------
// PgEventLog
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PgEventLog {
    pool: PgPool,
}

impl PgEventLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventLogStore for PgEventLog {
    async fn record_sent(&self, message: &EventMessage) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO event_log (id, type, state, payload)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(message.id)
        .bind(message.event_type.as_str())
        .bind(EventProcessingState::Sent.as_str())
        .bind(serde_json::Value::Object(message.payload.clone()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn transition(
        &self,
        message: &EventMessage,
        state: EventProcessingState,
        error: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO event_log (id, type, state, payload, error)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE
            SET state = EXCLUDED.state,
                error = EXCLUDED.error,
                updated_at = now()
            "#,
        )
        .bind(message.id)
        .bind(message.event_type.as_str())
        .bind(state.as_str())
        .bind(serde_json::Value::Object(message.payload.clone()))
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<EventLogEntry>> {
        let row = sqlx::query_as::<_, EventLogEntry>(
            r#"
            SELECT id, type, state, payload, error, created_at, updated_at
            FROM event_log
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }
}

// ---------------------------------------------------------------------------
// Arc<S> blanket, so one store can be shared by sender, processor and tests
// ---------------------------------------------------------------------------

#[async_trait]
impl<S: EventLogStore + ?Sized> EventLogStore for Arc<S> {
    async fn record_sent(&self, message: &EventMessage) -> Result<()> {
        (**self).record_sent(message).await
    }

    async fn transition(
        &self,
        message: &EventMessage,
        state: EventProcessingState,
        error: Option<&str>,
    ) -> Result<()> {
        (**self).transition(message, state, error).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<EventLogEntry>> {
        (**self).get(id).await
    }
}

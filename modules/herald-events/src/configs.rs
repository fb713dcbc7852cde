//! Event configuration store: `event_type -> [ActionConfig]`.
//!
//! Read-only from the pipeline's point of view. `PgActionConfigStore::upsert`
//! exists for seeding and tooling.

use std::sync::Arc;

use async_trait::async_trait;
use herald_common::{ActionConfig, EventType};
use sqlx::PgPool;

use crate::error::{Result, StoreError};

#[async_trait]
pub trait ActionConfigStore: Send + Sync {
    /// The ordered action list for an event type, or `None` if the type has no
    /// configuration row.
    async fn load(&self, event_type: &EventType) -> Result<Option<Vec<ActionConfig>>>;
}

#[derive(Clone)]
pub struct PgActionConfigStore {
    pool: PgPool,
}

impl PgActionConfigStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create or replace the configuration row for an event type.
    pub async fn upsert(&self, event_type: &EventType, actions: &[ActionConfig]) -> Result<()> {
        let processing = serde_json::to_value(actions).map_err(|source| StoreError::InvalidConfig {
            event_type: event_type.clone(),
            source,
        })?;

        sqlx::query(
            r#"
            INSERT INTO events (type, processing)
            VALUES ($1, $2)
            ON CONFLICT (type) DO UPDATE SET processing = EXCLUDED.processing
            "#,
        )
        .bind(event_type.as_str())
        .bind(processing)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl ActionConfigStore for PgActionConfigStore {
    async fn load(&self, event_type: &EventType) -> Result<Option<Vec<ActionConfig>>> {
        let row = sqlx::query_as::<_, (serde_json::Value,)>(
            "SELECT processing FROM events WHERE type = $1",
        )
        .bind(event_type.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some((processing,)) = row else {
            return Ok(None);
        };

        let actions =
            serde_json::from_value(processing).map_err(|source| StoreError::InvalidConfig {
                event_type: event_type.clone(),
                source,
            })?;

        Ok(Some(actions))
    }
}

#[async_trait]
impl<S: ActionConfigStore + ?Sized> ActionConfigStore for Arc<S> {
    async fn load(&self, event_type: &EventType) -> Result<Option<Vec<ActionConfig>>> {
        (**self).load(event_type).await
    }
}

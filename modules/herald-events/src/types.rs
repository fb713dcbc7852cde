use chrono::{DateTime, Utc};
use herald_common::{EventProcessingState, EventType};
use uuid::Uuid;

/// One row of the event log: the lifecycle of a single sent event.
#[derive(Debug, Clone, PartialEq)]
pub struct EventLogEntry {
    pub id: Uuid,
    pub event_type: EventType,
    pub state: EventProcessingState,
    pub payload: serde_json::Value,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for EventLogEntry {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> std::result::Result<Self, sqlx::Error> {
        use sqlx::Row;

        let state: String = row.try_get("state")?;
        let state = state
            .parse::<EventProcessingState>()
            .map_err(|e| sqlx::Error::Decode(e.into()))?;
        let event_type: String = row.try_get("type")?;

        Ok(EventLogEntry {
            id: row.try_get("id")?,
            event_type: EventType::new(event_type),
            state,
            payload: row.try_get("payload")?,
            error: row.try_get("error")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

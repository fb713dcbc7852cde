use herald_common::EventType;

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid action configuration for {event_type}: {source}")]
    InvalidConfig {
        event_type: EventType,
        #[source]
        source: serde_json::Error,
    },
}

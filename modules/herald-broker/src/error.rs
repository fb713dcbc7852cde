/// Result type alias for broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    #[error("Producer is closed")]
    Closed,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

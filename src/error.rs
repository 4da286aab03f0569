use thiserror::Error;

/// Main error type for the orders service
#[derive(Error, Debug)]
pub enum OrdersError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Ingestion errors
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    // Store errors
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Corrupt stored order {order_uid}: {reason}")]
    CorruptRecord { order_uid: String, reason: String },

    // Cache contract violations
    #[error("Invalid cache capacity: {0} (must be at least 1)")]
    InvalidCapacity(usize),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for OrdersError
pub type Result<T> = std::result::Result<T, OrdersError>;

/// Errors surfaced by an order feed instead of a payload
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    #[error("Feed closed")]
    Closed,

    #[error("No message within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Feed transport error: {0}")]
    Transport(String),
}

impl FeedError {
    /// Only closure ends consumption; everything else is retried by the consumer loop
    pub fn is_terminal(&self) -> bool {
        matches!(self, FeedError::Closed)
    }
}

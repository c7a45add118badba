//! Notification error types.

use thiserror::Error;

/// Errors that can occur while recording notifications.
///
/// A duplicate event is not an error.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// The notification store refused the operation.
    #[error("Notification store unavailable: {0}")]
    StoreUnavailable(String),

    /// A stored value could not be decoded.
    #[error("Invalid stored notification: {0}")]
    InvalidRecord(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// The event payload could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for notification operations.
pub type Result<T> = std::result::Result<T, NotificationError>;

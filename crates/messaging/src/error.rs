//! Messaging error types.

use thiserror::Error;

/// Error type returned by message handlers.
///
/// Handlers live in other crates with their own error enums; the envelope
/// handler only needs to log the failure and decide whether to retry.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Handler failure that retrying cannot fix.
///
/// The envelope handler dead-letters a message failing with this error on the
/// first attempt instead of spending its retry budget.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct Unretryable(#[source] pub BoxError);

impl Unretryable {
    /// Wraps a handler error as unretryable.
    pub fn new(error: impl Into<BoxError>) -> Self {
        Self(error.into())
    }
}

/// Errors that can occur when talking to the broker.
#[derive(Debug, Error)]
pub enum MessagingError {
    /// The broker did not accept a published message.
    #[error("Failed to publish to {exchange} with routing key {routing_key}: {reason}")]
    Publish {
        exchange: String,
        routing_key: String,
        reason: String,
    },

    /// The exchange has not been declared.
    #[error("Exchange not declared: {0}")]
    UnknownExchange(String),

    /// The queue has not been declared.
    #[error("Queue not declared: {0}")]
    UnknownQueue(String),

    /// The delivery was already acknowledged or rejected.
    #[error("Delivery already settled")]
    AlreadySettled,

    /// A message body could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for messaging operations.
pub type Result<T> = std::result::Result<T, MessagingError>;

//! Order Placement error types.

use common::OrderId;
use messaging::MessagingError;
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors that can occur while placing or loading orders.
#[derive(Debug, Error)]
pub enum OrderError {
    /// The request contained no items.
    #[error("Order must contain at least one item")]
    NoItems,

    /// A product id was empty or too long.
    #[error("Invalid product id for item {index}: must be between 1 and 255 characters")]
    InvalidProductId { index: usize },

    /// A quantity was below one or out of range.
    #[error("Invalid quantity for item {index}: {quantity} (must be at least 1)")]
    InvalidQuantity { index: usize, quantity: i64 },

    /// A unit price was negative.
    #[error("Invalid price for item {index}: {price} (must not be negative)")]
    InvalidPrice { index: usize, price: Decimal },

    /// The order total does not fit the decimal range.
    #[error("Order total is out of range")]
    TotalOutOfRange,

    /// No order exists with the given id.
    #[error("Order {0} not found")]
    NotFound(OrderId),

    /// The order store refused the operation.
    #[error("Order store unavailable: {0}")]
    StoreUnavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// The `order.created` event could not be published.
    #[error("Failed to publish order event: {0}")]
    Publish(#[from] MessagingError),
}

impl OrderError {
    /// Returns true for malformed input, rejected before any side effect.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            OrderError::NoItems
                | OrderError::InvalidProductId { .. }
                | OrderError::InvalidQuantity { .. }
                | OrderError::InvalidPrice { .. }
                | OrderError::TotalOutOfRange
        )
    }
}

/// Result type for Order Placement operations.
pub type Result<T> = std::result::Result<T, OrderError>;

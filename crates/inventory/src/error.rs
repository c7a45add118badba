//! Inventory error types.

use common::{OrderId, ProductId};
use messaging::MessagingError;
use thiserror::Error;

/// Business-rule failures of a reservation attempt.
///
/// These abort the reservation transaction and become an
/// `inventory.failed` event. They never escape `reserve_inventory`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReservationError {
    /// The order references a product with no inventory row.
    #[error("Product {0} not found in inventory")]
    ProductNotFound(ProductId),

    /// Not enough stock is available for a line.
    #[error(
        "Insufficient stock for product {product_id}: available={available}, requested={requested}"
    )]
    InsufficientStock {
        product_id: ProductId,
        available: u64,
        requested: u32,
    },
}

/// Infrastructure failures. These propagate so the delivery can be retried.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// The inventory store refused the operation.
    #[error("Inventory store unavailable: {0}")]
    StoreUnavailable(String),

    /// Releasing stock would take more than is reserved.
    #[error(
        "Cannot release {requested} of product {product_id}: only {reserved} reserved"
    )]
    ReleaseExceedsReserved {
        product_id: ProductId,
        reserved: u64,
        requested: u32,
    },

    /// A quantity does not fit in the stored column.
    #[error("Quantity out of range for product {0}")]
    QuantityOutOfRange(ProductId),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// An inventory event could not be published.
    #[error("Failed to publish inventory event: {0}")]
    Publish(#[from] MessagingError),

    /// `inventory.reserved` could not be published and undoing the committed
    /// reservation failed too. Stock stays reserved for the order and the
    /// reservation marker stays in place, so a redelivery would be taken as a
    /// duplicate.
    #[error(
        "Reservation for order {order_id} left in place: publish failed ({publish}), rollback failed ({rollback})"
    )]
    CompensationFailed {
        order_id: OrderId,
        publish: MessagingError,
        rollback: Box<InventoryError>,
    },
}

impl InventoryError {
    /// Returns true when retrying the delivery cannot repair the failure.
    pub fn is_unretryable(&self) -> bool {
        matches!(self, InventoryError::CompensationFailed { .. })
    }
}

/// Result type for inventory operations.
pub type Result<T> = std::result::Result<T, InventoryError>;

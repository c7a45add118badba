//! Transactional inventory store abstraction.

use async_trait::async_trait;
use common::{OrderId, ProductId};

use crate::{InventoryItem, InventoryReservation, Result};

/// Persistent storage for stock rows and reservation markers.
#[async_trait]
pub trait InventoryRepository: Send + Sync + 'static {
    /// Transaction type handed out by [`begin`](InventoryRepository::begin).
    type Tx: InventoryTransaction;

    /// Starts a transaction. Dropping it without commit rolls it back.
    async fn begin(&self) -> Result<Self::Tx>;

    /// Reads a stock row without locking it.
    async fn find_item(&self, product_id: &ProductId) -> Result<Option<InventoryItem>>;

    /// Creates a stock row unless one exists for the product, returning the
    /// stored row either way.
    async fn insert_item_if_absent(&self, item: InventoryItem) -> Result<InventoryItem>;
}

/// Operations inside one inventory transaction.
///
/// Every `*_for_update` read takes a write lock on the row that is held
/// until the transaction ends.
#[async_trait]
pub trait InventoryTransaction: Send {
    /// Loads the reservation marker for an order, locking it if present.
    async fn find_reservation_for_update(
        &mut self,
        order_id: OrderId,
    ) -> Result<Option<InventoryReservation>>;

    /// Inserts a reservation marker. Returns false if one already exists for
    /// the order, leaving the existing one in place.
    async fn insert_reservation(&mut self, reservation: &InventoryReservation) -> Result<bool>;

    /// Deletes the reservation marker for an order. Returns false if none existed.
    async fn delete_reservation(&mut self, order_id: OrderId) -> Result<bool>;

    /// Loads a stock row, locking it.
    async fn find_item_for_update(&mut self, product_id: &ProductId)
    -> Result<Option<InventoryItem>>;

    /// Writes back a stock row loaded in this transaction.
    async fn update_item(&mut self, item: &InventoryItem) -> Result<()>;

    /// Commits every change made in this transaction.
    async fn commit(self) -> Result<()>;

    /// Discards every change made in this transaction.
    async fn rollback(self) -> Result<()>;
}

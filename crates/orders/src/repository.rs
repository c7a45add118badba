//! Order store abstraction.

use std::sync::Arc;

use async_trait::async_trait;
use common::OrderId;

use crate::{NewOrder, Order, Result};

/// Persistent storage for orders and their items.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Stores the order header and all items atomically.
    ///
    /// Returns the committed order with store-assigned timestamps. On error
    /// nothing was stored.
    async fn insert(&self, order: NewOrder) -> Result<Order>;

    /// Loads an order with its items in request order.
    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>>;

    /// Deletes an order and its items. Returns false if it did not exist.
    async fn delete(&self, id: OrderId) -> Result<bool>;
}

#[async_trait]
impl<T: OrderRepository + ?Sized> OrderRepository for Arc<T> {
    async fn insert(&self, order: NewOrder) -> Result<Order> {
        (**self).insert(order).await
    }

    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>> {
        (**self).find_by_id(id).await
    }

    async fn delete(&self, id: OrderId) -> Result<bool> {
        (**self).delete(id).await
    }
}

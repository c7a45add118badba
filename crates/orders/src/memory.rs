//! In-memory order store.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use common::OrderId;
use tokio::sync::RwLock;

use crate::{NewOrder, Order, OrderError, OrderRepository, Result};

/// In-memory order store for tests and database-less runs.
///
/// Provides the same interface as the PostgreSQL implementation, plus
/// switches to make inserts or deletes fail.
#[derive(Clone, Default)]
pub struct InMemoryOrderRepository {
    orders: Arc<RwLock<HashMap<OrderId, Order>>>,
    fail_on_insert: Arc<AtomicBool>,
    fail_on_delete: Arc<AtomicBool>,
}

impl InMemoryOrderRepository {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent inserts fail without storing anything.
    pub fn set_fail_on_insert(&self, fail: bool) {
        self.fail_on_insert.store(fail, Ordering::SeqCst);
    }

    /// Makes subsequent deletes fail without removing anything.
    pub fn set_fail_on_delete(&self, fail: bool) {
        self.fail_on_delete.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.orders.read().await.len()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn insert(&self, order: NewOrder) -> Result<Order> {
        if self.fail_on_insert.load(Ordering::SeqCst) {
            return Err(OrderError::StoreUnavailable("insert rejected".to_string()));
        }

        let now = Utc::now();
        let order = order.into_order(now, now);
        self.orders.write().await.insert(order.id, order.clone());
        Ok(order)
    }

    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn delete(&self, id: OrderId) -> Result<bool> {
        if self.fail_on_delete.load(Ordering::SeqCst) {
            return Err(OrderError::StoreUnavailable("delete rejected".to_string()));
        }
        Ok(self.orders.write().await.remove(&id).is_some())
    }
}

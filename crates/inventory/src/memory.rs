//! In-memory inventory store.
//!
//! A transaction holds one store-wide lock for its whole lifetime and works
//! on a private copy of the tables that replaces the shared tables on
//! commit. This is coarser than row locks but gives the same guarantees:
//! no two transactions touch the same row at once, and an uncommitted
//! transaction leaves no trace.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use common::{OrderId, ProductId};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    InventoryError, InventoryItem, InventoryRepository, InventoryReservation,
    InventoryTransaction, Result,
};

const UNLIMITED: usize = usize::MAX;

#[derive(Debug, Clone, Default)]
struct Tables {
    items: HashMap<ProductId, InventoryItem>,
    reservations: HashMap<OrderId, InventoryReservation>,
}

/// In-memory inventory store for tests and database-less runs.
#[derive(Clone)]
pub struct InMemoryInventoryRepository {
    tables: Arc<Mutex<Tables>>,
    remaining_begins: Arc<AtomicUsize>,
    fail_on_update: Arc<AtomicBool>,
}

impl Default for InMemoryInventoryRepository {
    fn default() -> Self {
        Self {
            tables: Arc::default(),
            remaining_begins: Arc::new(AtomicUsize::new(UNLIMITED)),
            fail_on_update: Arc::default(),
        }
    }
}

impl InMemoryInventoryRepository {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allows `n` more transactions to begin; later ones fail.
    pub fn fail_transactions_after(&self, n: usize) {
        self.remaining_begins.store(n, Ordering::SeqCst);
    }

    /// Lets every transaction begin again.
    pub fn restore_transactions(&self) {
        self.remaining_begins.store(UNLIMITED, Ordering::SeqCst);
    }

    /// Makes stock row writes fail inside transactions.
    pub fn set_fail_on_update(&self, fail: bool) {
        self.fail_on_update.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of committed reservation markers.
    pub async fn reservation_count(&self) -> usize {
        self.tables.lock().await.reservations.len()
    }

    /// Returns true if a committed reservation marker exists for the order.
    pub async fn has_reservation(&self, order_id: OrderId) -> bool {
        self.tables.lock().await.reservations.contains_key(&order_id)
    }
}

#[async_trait]
impl InventoryRepository for InMemoryInventoryRepository {
    type Tx = InMemoryInventoryTransaction;

    async fn begin(&self) -> Result<Self::Tx> {
        let permitted = self
            .remaining_begins
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
                UNLIMITED => Some(n),
                0 => None,
                n => Some(n - 1),
            })
            .is_ok();
        if !permitted {
            return Err(InventoryError::StoreUnavailable(
                "transaction rejected".to_string(),
            ));
        }

        let guard = self.tables.clone().lock_owned().await;
        let working = guard.clone();
        Ok(InMemoryInventoryTransaction {
            guard,
            working,
            fail_on_update: self.fail_on_update.clone(),
        })
    }

    async fn find_item(&self, product_id: &ProductId) -> Result<Option<InventoryItem>> {
        Ok(self.tables.lock().await.items.get(product_id).cloned())
    }

    async fn insert_item_if_absent(&self, item: InventoryItem) -> Result<InventoryItem> {
        let mut tables = self.tables.lock().await;
        Ok(tables
            .items
            .entry(item.product_id.clone())
            .or_insert(item)
            .clone())
    }
}

/// Transaction over the in-memory store.
pub struct InMemoryInventoryTransaction {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
    fail_on_update: Arc<AtomicBool>,
}

#[async_trait]
impl InventoryTransaction for InMemoryInventoryTransaction {
    async fn find_reservation_for_update(
        &mut self,
        order_id: OrderId,
    ) -> Result<Option<InventoryReservation>> {
        Ok(self.working.reservations.get(&order_id).cloned())
    }

    async fn insert_reservation(&mut self, reservation: &InventoryReservation) -> Result<bool> {
        if self.working.reservations.contains_key(&reservation.order_id) {
            return Ok(false);
        }
        self.working
            .reservations
            .insert(reservation.order_id, reservation.clone());
        Ok(true)
    }

    async fn delete_reservation(&mut self, order_id: OrderId) -> Result<bool> {
        Ok(self.working.reservations.remove(&order_id).is_some())
    }

    async fn find_item_for_update(
        &mut self,
        product_id: &ProductId,
    ) -> Result<Option<InventoryItem>> {
        Ok(self.working.items.get(product_id).cloned())
    }

    async fn update_item(&mut self, item: &InventoryItem) -> Result<()> {
        if self.fail_on_update.load(Ordering::SeqCst) {
            return Err(InventoryError::StoreUnavailable(
                "update rejected".to_string(),
            ));
        }
        self.working
            .items
            .insert(item.product_id.clone(), item.clone());
        Ok(())
    }

    async fn commit(mut self) -> Result<()> {
        *self.guard = self.working;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}

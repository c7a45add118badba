//! In-memory notification store.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use common::{EventId, OrderId};
use tokio::sync::RwLock;

use crate::{NotificationError, NotificationRecord, NotificationRepository, Result};

/// In-memory notification store for tests and database-less runs.
#[derive(Clone, Default)]
pub struct InMemoryNotificationRepository {
    records: Arc<RwLock<Vec<NotificationRecord>>>,
    fail_on_insert: Arc<AtomicBool>,
}

impl InMemoryNotificationRepository {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent inserts fail.
    pub fn set_fail_on_insert(&self, fail: bool) {
        self.fail_on_insert.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of stored records.
    pub async fn record_count(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl NotificationRepository for InMemoryNotificationRepository {
    async fn insert(&self, record: &NotificationRecord) -> Result<bool> {
        if self.fail_on_insert.load(Ordering::SeqCst) {
            return Err(NotificationError::StoreUnavailable(
                "insert rejected".to_string(),
            ));
        }

        // Check and insert under one write lock, like a unique index
        let mut records = self.records.write().await;
        if records.iter().any(|r| r.event_id == record.event_id) {
            return Ok(false);
        }
        records.push(record.clone());
        Ok(true)
    }

    async fn find_by_event(&self, event_id: EventId) -> Result<Option<NotificationRecord>> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .find(|r| r.event_id == event_id)
            .cloned())
    }

    async fn find_by_order(&self, order_id: OrderId) -> Result<Vec<NotificationRecord>> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|r| r.order_id == order_id)
            .cloned()
            .collect())
    }
}

//! Notification store abstraction.

use std::sync::Arc;

use async_trait::async_trait;
use common::{EventId, OrderId};

use crate::{NotificationRecord, Result};

/// Append-only storage for notification records, unique on event id.
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// Inserts a record. Returns false, without error, if a record with the
    /// same event id already exists.
    async fn insert(&self, record: &NotificationRecord) -> Result<bool>;

    /// Loads the record for an event.
    async fn find_by_event(&self, event_id: EventId) -> Result<Option<NotificationRecord>>;

    /// Loads every record for an order, oldest first.
    async fn find_by_order(&self, order_id: OrderId) -> Result<Vec<NotificationRecord>>;
}

#[async_trait]
impl<T: NotificationRepository + ?Sized> NotificationRepository for Arc<T> {
    async fn insert(&self, record: &NotificationRecord) -> Result<bool> {
        (**self).insert(record).await
    }

    async fn find_by_event(&self, event_id: EventId) -> Result<Option<NotificationRecord>> {
        (**self).find_by_event(event_id).await
    }

    async fn find_by_order(&self, order_id: OrderId) -> Result<Vec<NotificationRecord>> {
        (**self).find_by_order(order_id).await
    }
}

//! Notification Sink service.

use common::{EventId, InventoryFailedEvent, InventoryReservedEvent, OrderCreatedEvent, OrderId};

use crate::{Notifiable, NotificationRecord, NotificationRepository, NotificationType, Result};

/// Records saga events idempotently.
pub struct NotificationService<R: NotificationRepository> {
    repository: R,
}

impl<R: NotificationRepository> NotificationService<R> {
    /// Creates a new notification service.
    pub fn new(repository: R) -> Self {
        Self { repository }
    }

    /// Returns a reference to the underlying notification store.
    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Records an event once.
    ///
    /// Returns false if a record with this event id already exists. Only
    /// storage failures are errors.
    #[tracing::instrument(skip(self, payload))]
    pub async fn record_event(
        &self,
        event_id: EventId,
        order_id: OrderId,
        notification_type: NotificationType,
        payload: serde_json::Value,
    ) -> Result<bool> {
        let record = NotificationRecord::new(event_id, order_id, notification_type, payload);

        if !self.repository.insert(&record).await? {
            metrics::counter!("notifications_duplicates_total").increment(1);
            tracing::warn!("event already recorded, skipping");
            return Ok(false);
        }

        metrics::counter!("notifications_recorded_total", "type" => notification_type.as_str())
            .increment(1);
        tracing::info!("notification recorded");
        Ok(true)
    }

    /// Records any notifiable event, keeping the full envelope as payload.
    pub async fn notify<E: Notifiable>(&self, event: &E) -> Result<bool> {
        let payload = serde_json::to_value(event)?;
        self.record_event(
            event.event_id(),
            event.order_id(),
            E::NOTIFICATION_TYPE,
            payload,
        )
        .await
    }

    /// Records an `order.created` event.
    pub async fn on_order_created(&self, event: &OrderCreatedEvent) -> Result<bool> {
        self.notify(event).await
    }

    /// Records an `inventory.reserved` event.
    pub async fn on_inventory_reserved(&self, event: &InventoryReservedEvent) -> Result<bool> {
        self.notify(event).await
    }

    /// Records an `inventory.failed` event.
    pub async fn on_inventory_failed(&self, event: &InventoryFailedEvent) -> Result<bool> {
        self.notify(event).await
    }

    /// Every record for an order, oldest first.
    pub async fn for_order(&self, order_id: OrderId) -> Result<Vec<NotificationRecord>> {
        self.repository.find_by_order(order_id).await
    }
}

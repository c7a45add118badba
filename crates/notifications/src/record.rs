//! Notification records.

use chrono::{DateTime, Utc};
use common::{
    EventId, IntegrationEvent, InventoryFailedEvent, InventoryReservedEvent, OrderCreatedEvent,
    OrderId,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of saga event a notification was recorded for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    OrderCreated,
    InventoryReserved,
    InventoryFailed,
}

impl NotificationType {
    /// Returns the persisted representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::OrderCreated => "ORDER_CREATED",
            NotificationType::InventoryReserved => "INVENTORY_RESERVED",
            NotificationType::InventoryFailed => "INVENTORY_FAILED",
        }
    }
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NotificationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ORDER_CREATED" => Ok(NotificationType::OrderCreated),
            "INVENTORY_RESERVED" => Ok(NotificationType::InventoryReserved),
            "INVENTORY_FAILED" => Ok(NotificationType::InventoryFailed),
            other => Err(format!("unknown notification type: {other}")),
        }
    }
}

/// An event the sink records.
pub trait Notifiable: IntegrationEvent {
    /// Type the event is recorded under.
    const NOTIFICATION_TYPE: NotificationType;
}

impl Notifiable for OrderCreatedEvent {
    const NOTIFICATION_TYPE: NotificationType = NotificationType::OrderCreated;
}

impl Notifiable for InventoryReservedEvent {
    const NOTIFICATION_TYPE: NotificationType = NotificationType::InventoryReserved;
}

impl Notifiable for InventoryFailedEvent {
    const NOTIFICATION_TYPE: NotificationType = NotificationType::InventoryFailed;
}

/// One recorded event. Never updated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    pub id: Uuid,
    pub event_id: EventId,
    pub order_id: OrderId,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NotificationRecord {
    /// Creates a record stamped now.
    pub fn new(
        event_id: EventId,
        order_id: OrderId,
        notification_type: NotificationType,
        payload: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            event_id,
            order_id,
            notification_type,
            payload,
            created_at: now,
            updated_at: now,
        }
    }
}

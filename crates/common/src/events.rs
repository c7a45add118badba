//! Event envelopes exchanged over the broker.
//!
//! These are wire contracts: field names are camelCase JSON, consumers ignore
//! unknown fields, and an envelope is never mutated once published.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::topics;
use crate::types::{EventId, OrderId, ProductId};

/// A broker event with a fixed destination.
///
/// Implemented by every envelope so publishers and consumers derive the
/// exchange and routing key from the type instead of repeating string literals.
pub trait IntegrationEvent: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Exchange the event is published to.
    const EXCHANGE: &'static str;

    /// Routing key the event is published with.
    const ROUTING_KEY: &'static str;

    /// Idempotency key of this particular envelope.
    fn event_id(&self) -> EventId;

    /// Order the event concerns.
    fn order_id(&self) -> OrderId;
}

/// Lifecycle status of an order. Order Placement only ever produces `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Cancelled,
}

impl OrderStatus {
    /// Returns the persisted/wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(OrderStatus::Pending),
            "CONFIRMED" => Ok(OrderStatus::Confirmed),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}

/// Published by Order Placement after an order is committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreatedEvent {
    pub event_id: EventId,
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub total_amount: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<OrderCreatedItem>,
}

/// A line item as carried on [`OrderCreatedEvent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreatedItem {
    pub order_item_id: Uuid,
    pub product_id: ProductId,
    pub quantity: u32,
    pub price: Decimal,
}

impl IntegrationEvent for OrderCreatedEvent {
    const EXCHANGE: &'static str = topics::ORDERS_EXCHANGE;
    const ROUTING_KEY: &'static str = topics::ORDER_CREATED;

    fn event_id(&self) -> EventId {
        self.event_id
    }

    fn order_id(&self) -> OrderId {
        self.order_id
    }
}

/// Published by Inventory Reservation once stock for every line is held.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryReservedEvent {
    pub event_id: EventId,
    pub order_id: OrderId,
    pub reserved_at: DateTime<Utc>,
    pub items: Vec<ReservedItem>,
}

/// Product and quantity held by a reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservedItem {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl InventoryReservedEvent {
    /// Creates a reserved event with a fresh event id, stamped now.
    pub fn new(order_id: OrderId, items: Vec<ReservedItem>) -> Self {
        Self {
            event_id: EventId::new(),
            order_id,
            reserved_at: Utc::now(),
            items,
        }
    }
}

impl IntegrationEvent for InventoryReservedEvent {
    const EXCHANGE: &'static str = topics::INVENTORY_EXCHANGE;
    const ROUTING_KEY: &'static str = topics::INVENTORY_RESERVED;

    fn event_id(&self) -> EventId {
        self.event_id
    }

    fn order_id(&self) -> OrderId {
        self.order_id
    }
}

/// Published by Inventory Reservation when an order cannot be reserved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryFailedEvent {
    pub event_id: EventId,
    pub order_id: OrderId,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

impl InventoryFailedEvent {
    /// Creates a failed event with a fresh event id, stamped now.
    pub fn new(order_id: OrderId, reason: impl Into<String>) -> Self {
        Self {
            event_id: EventId::new(),
            order_id,
            reason: reason.into(),
            failed_at: Utc::now(),
        }
    }
}

impl IntegrationEvent for InventoryFailedEvent {
    const EXCHANGE: &'static str = topics::INVENTORY_EXCHANGE;
    const ROUTING_KEY: &'static str = topics::INVENTORY_FAILED;

    fn event_id(&self) -> EventId {
        self.event_id
    }

    fn order_id(&self) -> OrderId {
        self.order_id
    }
}

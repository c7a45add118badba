//! Exchange and routing-key names shared by publishers and consumers.

/// Topic exchange carrying order lifecycle events.
pub const ORDERS_EXCHANGE: &str = "orders.events";

/// Topic exchange carrying inventory outcomes.
pub const INVENTORY_EXCHANGE: &str = "inventory.events";

/// Routing key for [`crate::OrderCreatedEvent`].
pub const ORDER_CREATED: &str = "order.created";

/// Routing key for [`crate::InventoryReservedEvent`].
pub const INVENTORY_RESERVED: &str = "inventory.reserved";

/// Routing key for [`crate::InventoryFailedEvent`].
pub const INVENTORY_FAILED: &str = "inventory.failed";

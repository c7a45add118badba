//! Shared identifiers and wire contracts for the order saga services.
//!
//! Order Placement, Inventory Reservation and the Notification Sink never call
//! each other directly. Everything they agree on lives here: the identifier
//! newtypes, the three event envelopes and the exchange/routing-key names.

pub mod events;
pub mod topics;
pub mod types;

pub use events::{
    IntegrationEvent, InventoryFailedEvent, InventoryReservedEvent, OrderCreatedEvent,
    OrderCreatedItem, OrderStatus, ReservedItem,
};
pub use types::{EventId, OrderId, ProductId};

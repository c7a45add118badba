//! Inventory Reservation.
//!
//! Consumes `order.created` and moves each order through
//! `UNSEEN -> RESERVING -> RESERVED | FAILED`, with a compensating
//! `RESERVED -> ROLLED_BACK` edge when `inventory.reserved` cannot be
//! published.
//!
//! All stock mutation happens inside one store transaction that holds write
//! locks on the rows it touches. No lock is held across a broker publish.

pub mod error;
pub mod handler;
pub mod item;
pub mod memory;
pub mod postgres;
pub mod repository;
pub mod service;

pub use error::{InventoryError, ReservationError, Result};
pub use handler::ReserveOnOrderCreated;
pub use item::{InventoryItem, InventoryReservation};
pub use memory::{InMemoryInventoryRepository, InMemoryInventoryTransaction};
pub use postgres::{PostgresInventoryRepository, PostgresInventoryTransaction};
pub use repository::{InventoryRepository, InventoryTransaction};
pub use service::{InventoryService, ReservationOutcome};

//! Order Placement.
//!
//! Validates and totals an order request, commits the order with its items in
//! one local transaction, then publishes `order.created`. If the publish
//! fails the committed order is deleted again and the publish failure is
//! returned, so a caller never sees an order that downstream services were
//! not told about.

pub mod error;
pub mod memory;
pub mod order;
pub mod postgres;
pub mod repository;
pub mod service;

pub use error::{OrderError, Result};
pub use memory::InMemoryOrderRepository;
pub use order::{CreateOrder, CreateOrderItem, NewOrder, NewOrderItem, Order, OrderItem};
pub use postgres::PostgresOrderRepository;
pub use repository::OrderRepository;
pub use service::OrderService;

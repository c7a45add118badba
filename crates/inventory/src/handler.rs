//! Broker entry point for Inventory Reservation.

use std::sync::Arc;

use async_trait::async_trait;
use common::OrderCreatedEvent;
use messaging::{BoxError, EventHandler, Publisher, Unretryable};

use crate::{InventoryRepository, InventoryService};

/// Handles `order.created` by reserving stock.
///
/// Only infrastructure failures are returned as errors; duplicates and
/// business rejections complete normally so the delivery is acked. A failed
/// rollback is unretryable: the reservation marker it leaves behind would
/// turn every redelivery into a silent duplicate, so the message goes
/// straight to the dead-letter queue.
pub struct ReserveOnOrderCreated<R: InventoryRepository, P: Publisher> {
    service: Arc<InventoryService<R, P>>,
}

impl<R: InventoryRepository, P: Publisher> ReserveOnOrderCreated<R, P> {
    /// Creates the handler around a shared service.
    pub fn new(service: Arc<InventoryService<R, P>>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<R: InventoryRepository, P: Publisher> EventHandler<OrderCreatedEvent>
    for ReserveOnOrderCreated<R, P>
{
    async fn handle(&self, event: OrderCreatedEvent) -> Result<(), BoxError> {
        match self.service.reserve_inventory(&event).await {
            Ok(_) => Ok(()),
            Err(error) if error.is_unretryable() => Err(Unretryable::new(error).into()),
            Err(error) => Err(error.into()),
        }
    }
}

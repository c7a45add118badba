//! Inventory Reservation service.

use common::{
    InventoryFailedEvent, InventoryReservedEvent, OrderCreatedEvent, OrderId, ProductId,
    ReservedItem,
};
use messaging::{MessagingError, Publisher, PublisherExt};

use crate::{
    InventoryError, InventoryItem, InventoryRepository, InventoryReservation,
    InventoryTransaction, ReservationError, Result,
};

/// How a reservation attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReservationOutcome {
    /// Stock for every line is held and `inventory.reserved` was published.
    Reserved(Vec<ReservedItem>),
    /// A business rule rejected the order. No stock changed and
    /// `inventory.failed` was published on a best-effort basis.
    Rejected(ReservationError),
    /// The order was already processed. Nothing changed, nothing published.
    Duplicate,
}

impl ReservationOutcome {
    fn label(&self) -> &'static str {
        match self {
            ReservationOutcome::Reserved(_) => "reserved",
            ReservationOutcome::Rejected(_) => "rejected",
            ReservationOutcome::Duplicate => "duplicate",
        }
    }
}

/// Reserves stock for orders and serves stock levels.
pub struct InventoryService<R: InventoryRepository, P: Publisher> {
    repository: R,
    publisher: P,
}

impl<R: InventoryRepository, P: Publisher> InventoryService<R, P> {
    /// Creates a new inventory service.
    pub fn new(repository: R, publisher: P) -> Self {
        Self {
            repository,
            publisher,
        }
    }

    /// Returns a reference to the underlying inventory store.
    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Reserves stock for every line of a newly created order.
    ///
    /// A redelivered event for an order that already holds a reservation is
    /// a no-op. Business failures roll the transaction back and are reported
    /// through `inventory.failed`; they are not errors. If `inventory.reserved`
    /// cannot be published the reservation is undone in a separate
    /// transaction and the publish error is returned. If undoing it fails as
    /// well, [`InventoryError::CompensationFailed`] is returned instead.
    #[tracing::instrument(skip(self, event), fields(order_id = %event.order_id, event_id = %event.event_id))]
    pub async fn reserve_inventory(&self, event: &OrderCreatedEvent) -> Result<ReservationOutcome> {
        let outcome = self.reserve_in_transaction(event).await?;

        match &outcome {
            ReservationOutcome::Duplicate => {
                tracing::warn!("order already has a reservation, skipping");
            }
            ReservationOutcome::Rejected(reason) => {
                tracing::warn!(%reason, "reservation rejected");
                let failed = InventoryFailedEvent::new(event.order_id, reason.to_string());
                if let Err(error) = self.publisher.publish_event(&failed).await {
                    tracing::error!(%error, "failed to publish inventory.failed");
                }
            }
            ReservationOutcome::Reserved(items) => {
                let reserved = InventoryReservedEvent::new(event.order_id, items.clone());
                if let Err(publish_error) = self.publisher.publish_event(&reserved).await {
                    tracing::error!(
                        error = %publish_error,
                        "failed to publish inventory.reserved, rolling back reservation"
                    );
                    return Err(self.compensate(event.order_id, items, publish_error).await);
                }
                tracing::info!(
                    reserved_event_id = %reserved.event_id,
                    lines = items.len(),
                    "inventory reserved"
                );
            }
        }

        metrics::counter!("inventory_reservations_total", "outcome" => outcome.label())
            .increment(1);
        Ok(outcome)
    }

    /// Undoes a committed reservation: removes the order's marker and returns
    /// every reserved unit to available stock.
    #[tracing::instrument(skip(self, items))]
    pub async fn release_reservation(&self, order_id: OrderId, items: &[ReservedItem]) -> Result<()> {
        let mut tx = self.repository.begin().await?;

        if !tx.delete_reservation(order_id).await? {
            tracing::warn!("no reservation marker to delete");
        }

        for line in items {
            let Some(mut item) = tx.find_item_for_update(&line.product_id).await? else {
                tracing::warn!(product_id = %line.product_id, "inventory row missing during release");
                continue;
            };
            item.release(line.quantity)?;
            tx.update_item(&item).await?;
        }

        tx.commit().await
    }

    /// Current stock for a product.
    pub async fn stock(&self, product_id: &ProductId) -> Result<Option<InventoryItem>> {
        self.repository.find_item(product_id).await
    }

    /// Creates stock rows for products that have none. Existing rows are
    /// left untouched.
    pub async fn seed(&self, stock: &[(ProductId, u64)]) -> Result<()> {
        for (product_id, available) in stock {
            let item = self
                .repository
                .insert_item_if_absent(InventoryItem::new(product_id.clone(), *available))
                .await?;
            tracing::debug!(
                product_id = %item.product_id,
                available = item.available_quantity,
                reserved = item.reserved_quantity,
                "inventory seeded"
            );
        }
        Ok(())
    }

    async fn reserve_in_transaction(&self, event: &OrderCreatedEvent) -> Result<ReservationOutcome> {
        let mut tx = self.repository.begin().await?;

        if tx.find_reservation_for_update(event.order_id).await?.is_some() {
            tx.rollback().await?;
            return Ok(ReservationOutcome::Duplicate);
        }

        if !tx
            .insert_reservation(&InventoryReservation::new(event.order_id))
            .await?
        {
            tx.rollback().await?;
            return Ok(ReservationOutcome::Duplicate);
        }

        let mut reserved = Vec::with_capacity(event.items.len());
        for line in &event.items {
            let checked = match tx.find_item_for_update(&line.product_id).await? {
                None => Err(ReservationError::ProductNotFound(line.product_id.clone())),
                Some(mut item) => item.reserve(line.quantity).map(|()| item),
            };

            let item = match checked {
                Ok(item) => item,
                Err(reason) => {
                    tx.rollback().await?;
                    return Ok(ReservationOutcome::Rejected(reason));
                }
            };

            tx.update_item(&item).await?;
            reserved.push(ReservedItem {
                product_id: line.product_id.clone(),
                quantity: line.quantity,
            });
        }

        tx.commit().await?;
        Ok(ReservationOutcome::Reserved(reserved))
    }

    /// Rolls back a reservation whose event could not be published and
    /// returns the error to report for the delivery.
    async fn compensate(
        &self,
        order_id: OrderId,
        items: &[ReservedItem],
        publish_error: MessagingError,
    ) -> InventoryError {
        match self.release_reservation(order_id, items).await {
            Ok(()) => {
                metrics::counter!("inventory_compensations_total").increment(1);
                tracing::info!(%order_id, "reservation rolled back");
                InventoryError::Publish(publish_error)
            }
            Err(error) => {
                metrics::counter!("inventory_compensation_failures_total").increment(1);
                tracing::error!(
                    %order_id,
                    %error,
                    "failed to roll back reservation, stock left reserved"
                );
                InventoryError::CompensationFailed {
                    order_id,
                    publish: publish_error,
                    rollback: Box::new(error),
                }
            }
        }
    }
}

//! Order Placement service.

use common::OrderId;
use messaging::{Publisher, PublisherExt};

use crate::{CreateOrder, Order, OrderError, OrderRepository, Result};

/// Places orders and serves them back.
///
/// An order is only reported as created once it is both committed and
/// announced on the broker.
pub struct OrderService<R: OrderRepository, P: Publisher> {
    repository: R,
    publisher: P,
}

impl<R: OrderRepository, P: Publisher> OrderService<R, P> {
    /// Creates a new order service.
    pub fn new(repository: R, publisher: P) -> Self {
        Self {
            repository,
            publisher,
        }
    }

    /// Returns a reference to the underlying order store.
    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Validates, stores and announces a new order.
    ///
    /// Validation failures have no side effects. If the `order.created`
    /// publish fails the stored order is deleted again and the publish error
    /// is returned; a failing delete is logged and does not replace it.
    #[tracing::instrument(skip(self, request), fields(items = request.items.len()))]
    pub async fn create_order(&self, request: CreateOrder) -> Result<Order> {
        let new_order = request.validate()?;
        let order = self.repository.insert(new_order).await?;
        let event = order.created_event();

        if let Err(publish_error) = self.publisher.publish_event(&event).await {
            tracing::warn!(
                order_id = %order.id,
                error = %publish_error,
                "failed to publish order.created, deleting order"
            );
            self.compensate(order.id).await;
            return Err(OrderError::Publish(publish_error));
        }

        metrics::counter!("orders_created_total").increment(1);
        tracing::info!(
            order_id = %order.id,
            event_id = %event.event_id,
            total_amount = %order.total_amount,
            "order created"
        );
        Ok(order)
    }

    /// Loads an order with its items.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, id: OrderId) -> Result<Order> {
        self.repository
            .find_by_id(id)
            .await?
            .ok_or(OrderError::NotFound(id))
    }

    async fn compensate(&self, id: OrderId) {
        match self.repository.delete(id).await {
            Ok(_) => {
                metrics::counter!("orders_compensated_total").increment(1);
                tracing::info!(order_id = %id, "order deleted after failed publish");
            }
            Err(error) => {
                metrics::counter!("orders_compensation_failures_total").increment(1);
                tracing::error!(
                    order_id = %id,
                    %error,
                    "failed to delete order after failed publish"
                );
            }
        }
    }
}

//! Order model, request validation and the `order.created` payload.

use chrono::{DateTime, Utc};
use common::{EventId, OrderCreatedEvent, OrderCreatedItem, OrderId, OrderStatus, ProductId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{OrderError, Result};

/// Longest product id accepted on an order line.
pub const MAX_PRODUCT_ID_LEN: usize = 255;

/// A committed order with its line items.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub status: OrderStatus,
    pub total_amount: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<OrderItem>,
}

/// A committed order line.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: Uuid,
    pub product_id: ProductId,
    pub quantity: u32,
    pub price: Decimal,
}

impl Order {
    /// Builds the `order.created` event for this order with a fresh event id.
    ///
    /// The event carries exactly the persisted values, including the
    /// store-assigned timestamps.
    pub fn created_event(&self) -> OrderCreatedEvent {
        OrderCreatedEvent {
            event_id: EventId::new(),
            order_id: self.id,
            status: self.status,
            total_amount: self.total_amount,
            created_at: self.created_at,
            updated_at: self.updated_at,
            items: self
                .items
                .iter()
                .map(|item| OrderCreatedItem {
                    order_item_id: item.id,
                    product_id: item.product_id.clone(),
                    quantity: item.quantity,
                    price: item.price,
                })
                .collect(),
        }
    }
}

/// An order request as submitted by a client.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrder {
    pub items: Vec<CreateOrderItem>,
}

/// One requested line. Quantity is signed so that malformed requests reach
/// validation instead of failing to parse.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderItem {
    pub product_id: String,
    pub quantity: i64,
    pub price: Decimal,
}

impl CreateOrderItem {
    /// Creates a requested line.
    pub fn new(product_id: impl Into<String>, quantity: i64, price: Decimal) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
            price,
        }
    }
}

impl CreateOrder {
    /// Creates a request from its lines.
    pub fn new(items: Vec<CreateOrderItem>) -> Self {
        Self { items }
    }

    /// Validates the request and computes the order total.
    ///
    /// Fresh ids are assigned to the order and each line. Nothing is
    /// persisted.
    pub fn validate(self) -> Result<NewOrder> {
        if self.items.is_empty() {
            return Err(OrderError::NoItems);
        }

        let mut total = Decimal::ZERO;
        let mut items = Vec::with_capacity(self.items.len());

        for (index, item) in self.items.into_iter().enumerate() {
            let len = item.product_id.chars().count();
            if len == 0 || len > MAX_PRODUCT_ID_LEN {
                return Err(OrderError::InvalidProductId { index });
            }

            let quantity = u32::try_from(item.quantity)
                .ok()
                .filter(|q| *q >= 1)
                .ok_or(OrderError::InvalidQuantity {
                    index,
                    quantity: item.quantity,
                })?;

            if item.price < Decimal::ZERO {
                return Err(OrderError::InvalidPrice {
                    index,
                    price: item.price,
                });
            }

            total = Decimal::from(quantity)
                .checked_mul(item.price)
                .and_then(|line| total.checked_add(line))
                .ok_or(OrderError::TotalOutOfRange)?;

            items.push(NewOrderItem {
                id: Uuid::new_v4(),
                product_id: ProductId::new(item.product_id),
                quantity,
                price: item.price,
            });
        }

        Ok(NewOrder {
            id: OrderId::new(),
            status: OrderStatus::Pending,
            total_amount: total,
            items,
        })
    }
}

/// A validated order ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub id: OrderId,
    pub status: OrderStatus,
    pub total_amount: Decimal,
    pub items: Vec<NewOrderItem>,
}

/// A validated order line ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrderItem {
    pub id: Uuid,
    pub product_id: ProductId,
    pub quantity: u32,
    pub price: Decimal,
}

impl NewOrder {
    /// Attaches store-assigned timestamps, yielding the committed order.
    pub fn into_order(self, created_at: DateTime<Utc>, updated_at: DateTime<Utc>) -> Order {
        Order {
            id: self.id,
            status: self.status,
            total_amount: self.total_amount,
            created_at,
            updated_at,
            items: self
                .items
                .into_iter()
                .map(|item| OrderItem {
                    id: item.id,
                    product_id: item.product_id,
                    quantity: item.quantity,
                    price: item.price,
                })
                .collect(),
        }
    }
}

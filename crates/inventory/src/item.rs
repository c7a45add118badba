//! Stock rows and reservation markers.

use chrono::{DateTime, Utc};
use common::{OrderId, ProductId};
use serde::Serialize;
use uuid::Uuid;

use crate::{InventoryError, ReservationError};

/// Stock held for one product.
///
/// `available_quantity + reserved_quantity` is conserved by [`reserve`] and
/// [`release`], which are exact inverses.
///
/// [`reserve`]: InventoryItem::reserve
/// [`release`]: InventoryItem::release
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    pub id: Uuid,
    pub product_id: ProductId,
    pub available_quantity: u64,
    pub reserved_quantity: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InventoryItem {
    /// Creates a stock row with nothing reserved.
    pub fn new(product_id: impl Into<ProductId>, available_quantity: u64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            product_id: product_id.into(),
            available_quantity,
            reserved_quantity: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Total units on hand, reserved or not.
    pub fn on_hand(&self) -> u64 {
        self.available_quantity + self.reserved_quantity
    }

    /// Moves `quantity` units from available to reserved.
    pub fn reserve(&mut self, quantity: u32) -> Result<(), ReservationError> {
        let requested = u64::from(quantity);
        if self.available_quantity < requested {
            return Err(ReservationError::InsufficientStock {
                product_id: self.product_id.clone(),
                available: self.available_quantity,
                requested: quantity,
            });
        }

        self.available_quantity -= requested;
        self.reserved_quantity += requested;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Moves `quantity` units from reserved back to available.
    pub fn release(&mut self, quantity: u32) -> Result<(), InventoryError> {
        let requested = u64::from(quantity);
        if self.reserved_quantity < requested {
            return Err(InventoryError::ReleaseExceedsReserved {
                product_id: self.product_id.clone(),
                reserved: self.reserved_quantity,
                requested: quantity,
            });
        }

        self.reserved_quantity -= requested;
        self.available_quantity += requested;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Marker that an order's stock has been decremented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryReservation {
    pub id: Uuid,
    pub order_id: OrderId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InventoryReservation {
    /// Creates a reservation marker for an order.
    pub fn new(order_id: OrderId) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            order_id,
            created_at: now,
            updated_at: now,
        }
    }
}

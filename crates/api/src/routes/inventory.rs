//! Stock lookup endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::ProductId;
use inventory::{InventoryItem, InventoryRepository, InventoryService};
use messaging::InMemoryBroker;

use crate::error::ApiError;

/// GET /inventory/{product_id}: current available and reserved stock.
#[tracing::instrument(skip(service))]
pub async fn get<I: InventoryRepository>(
    State(service): State<Arc<InventoryService<I, InMemoryBroker>>>,
    Path(product_id): Path<String>,
) -> Result<Json<InventoryItem>, ApiError> {
    let product_id = ProductId::new(product_id);
    service
        .stock(&product_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Product {product_id} not found in inventory")))
}

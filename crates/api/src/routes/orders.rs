//! Order Placement endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::OrderId;
use orders::{CreateOrder, Order};

use crate::OrderPlacement;
use crate::error::ApiError;

/// POST /orders: validate, store and announce a new order.
#[tracing::instrument(skip(service, payload))]
pub async fn create(
    State(service): State<Arc<OrderPlacement>>,
    payload: Result<Json<CreateOrder>, JsonRejection>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let Json(request) = payload?;
    let order = service.create_order(request).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /orders/{id}: load an order with its items.
#[tracing::instrument(skip(service))]
pub async fn get(
    State(service): State<Arc<OrderPlacement>>,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order_id = parse_order_id(&id)?;
    Ok(Json(service.get_order(order_id).await?))
}

pub(crate) fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    OrderId::parse(id).map_err(|e| ApiError::BadRequest(format!("Invalid order id: {e}")))
}

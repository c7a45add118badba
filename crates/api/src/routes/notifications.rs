//! Notification lookup endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use notifications::NotificationRecord;

use crate::NotificationSink;
use crate::error::ApiError;
use crate::routes::orders::parse_order_id;

/// GET /notifications/{order_id}: every saga event recorded for an order.
#[tracing::instrument(skip(service))]
pub async fn list(
    State(service): State<Arc<NotificationSink>>,
    Path(order_id): Path<String>,
) -> Result<Json<Vec<NotificationRecord>>, ApiError> {
    let order_id = parse_order_id(&order_id)?;
    Ok(Json(service.for_order(order_id).await?))
}

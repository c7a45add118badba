//! HTTP API and consumer host for the order saga services.
//!
//! Wires Order Placement, Inventory Reservation and the Notification Sink to
//! one broker, declares each service's subscription table, and exposes the
//! HTTP surface with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use common::{InventoryFailedEvent, InventoryReservedEvent, OrderCreatedEvent, ProductId};
use inventory::{InventoryRepository, InventoryService, ReserveOnOrderCreated};
use messaging::{Consumer, DeadLetter, InMemoryBroker, QueueSpec, RetryPolicy, Subscription};
use metrics_exporter_prometheus::PrometheusHandle;
use notifications::{NotificationRepository, NotificationService, RecordNotification};
use orders::{OrderRepository, OrderService};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Service name owning the inventory queues.
pub const INVENTORY_SERVICE: &str = "inventory-service";

/// Service name owning the notification queues.
pub const NOTIFICATION_SERVICE: &str = "notification-service";

/// Stock seeded on startup when enabled.
pub const SEED_STOCK: [(&str, u64); 2] = [("prod-abc", 100), ("prod-xyz", 50)];

/// Order Placement over any order store.
pub type OrderPlacement = OrderService<Arc<dyn OrderRepository>, InMemoryBroker>;

/// Notification Sink over any notification store.
pub type NotificationSink = NotificationService<Arc<dyn NotificationRepository>>;

/// The three services sharing one broker.
pub struct AppState<I: InventoryRepository> {
    pub broker: InMemoryBroker,
    pub orders: Arc<OrderPlacement>,
    pub inventory: Arc<InventoryService<I, InMemoryBroker>>,
    pub notifications: Arc<NotificationSink>,
}

impl<I: InventoryRepository> AppState<I> {
    /// Builds the services on top of the given stores.
    pub fn new(
        broker: InMemoryBroker,
        order_repository: Arc<dyn OrderRepository>,
        inventory_repository: I,
        notification_repository: Arc<dyn NotificationRepository>,
    ) -> Self {
        Self {
            orders: Arc::new(OrderService::new(order_repository, broker.clone())),
            inventory: Arc::new(InventoryService::new(inventory_repository, broker.clone())),
            notifications: Arc::new(NotificationService::new(notification_repository)),
            broker,
        }
    }

    /// Seeds the demo stock, leaving existing rows untouched.
    pub async fn seed_inventory(&self) -> inventory::Result<()> {
        let stock: Vec<(ProductId, u64)> = SEED_STOCK
            .iter()
            .map(|(product, quantity)| (ProductId::new(*product), *quantity))
            .collect();
        self.inventory.seed(&stock).await
    }

    /// Subscription tables of Inventory Reservation and the Notification Sink.
    pub fn subscriptions(&self) -> Vec<Subscription> {
        let inventory_dlx = DeadLetter::for_service(INVENTORY_SERVICE).exchange;
        let notification_dlx = DeadLetter::for_service(NOTIFICATION_SERVICE).exchange;
        let queue = |service: &str, route: &str, dlx: &str| {
            QueueSpec::durable(format!("{service}.{route}")).with_dead_letter_exchange(dlx)
        };

        vec![
            Subscription::to_event::<OrderCreatedEvent, _>(
                queue(INVENTORY_SERVICE, "orders.created", &inventory_dlx),
                ReserveOnOrderCreated::new(self.inventory.clone()),
            ),
            Subscription::to_event::<OrderCreatedEvent, _>(
                queue(NOTIFICATION_SERVICE, "orders.created", &notification_dlx),
                RecordNotification::new(self.notifications.clone()),
            ),
            Subscription::to_event::<InventoryReservedEvent, _>(
                queue(NOTIFICATION_SERVICE, "inventory.reserved", &notification_dlx),
                RecordNotification::new(self.notifications.clone()),
            ),
            Subscription::to_event::<InventoryFailedEvent, _>(
                queue(NOTIFICATION_SERVICE, "inventory.failed", &notification_dlx),
                RecordNotification::new(self.notifications.clone()),
            ),
        ]
    }

    /// Builds a consumer over every subscription and declares the broker
    /// topology it needs, including the exchanges the services publish to.
    pub async fn consumer(&self, policy: RetryPolicy) -> messaging::Result<Consumer> {
        let consumer = self
            .subscriptions()
            .into_iter()
            .fold(Consumer::new(self.broker.clone(), policy), Consumer::subscribe);
        consumer.declare().await?;
        Ok(consumer)
    }
}

/// Creates the Axum application router.
pub fn create_app<I: InventoryRepository>(
    state: &AppState<I>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    let orders_router = Router::new()
        .route("/orders", post(routes::orders::create))
        .route("/orders/{id}", get(routes::orders::get))
        .with_state(state.orders.clone());

    let inventory_router = Router::new()
        .route("/inventory/{product_id}", get(routes::inventory::get::<I>))
        .with_state(state.inventory.clone());

    let notifications_router = Router::new()
        .route("/notifications/{order_id}", get(routes::notifications::list))
        .with_state(state.notifications.clone());

    Router::new()
        .route("/health", get(routes::health::check))
        .merge(orders_router)
        .merge(inventory_router)
        .merge(notifications_router)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

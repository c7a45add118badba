//! API server entry point.

use std::sync::Arc;

use api::AppState;
use api::config::{Config, LogFormat};
use inventory::{InMemoryInventoryRepository, InventoryRepository, PostgresInventoryRepository};
use messaging::{InMemoryBroker, RetryPolicy};
use metrics_exporter_prometheus::PrometheusHandle;
use notifications::{InMemoryNotificationRepository, PostgresNotificationRepository};
use orders::{InMemoryOrderRepository, PostgresOrderRepository};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let json = config.log_format == LogFormat::Json;
    tracing_subscriber::registry()
        .with(EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .init();
}

async fn serve<I: InventoryRepository>(
    config: Config,
    state: AppState<I>,
    metrics_handle: PrometheusHandle,
) {
    if config.seed_inventory {
        state
            .seed_inventory()
            .await
            .expect("failed to seed inventory");
    }

    let consumer = state
        .consumer(RetryPolicy::new(config.max_delivery_retries))
        .await
        .expect("failed to declare broker topology");
    let workers = consumer.spawn(config.consumer_workers);
    tracing::info!(workers = workers.worker_count(), "consumers started");

    let app = api::create_app(&state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    workers.shutdown().await;
    tracing::info!("server shut down gracefully");
}

#[tokio::main]
async fn main() {
    // 1. Load configuration and initialize tracing
    let config = Config::from_env();
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Pick the stores and run the services
    let broker = InMemoryBroker::new();
    match config.database_url.clone() {
        Some(url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(10)
                .connect(&url)
                .await
                .expect("failed to connect to database");

            let order_repository = PostgresOrderRepository::new(pool.clone());
            let inventory_repository = PostgresInventoryRepository::new(pool.clone());
            let notification_repository = PostgresNotificationRepository::new(pool);
            order_repository
                .run_migrations()
                .await
                .expect("order migrations failed");
            inventory_repository
                .run_migrations()
                .await
                .expect("inventory migrations failed");
            notification_repository
                .run_migrations()
                .await
                .expect("notification migrations failed");
            tracing::info!("using PostgreSQL stores");

            let state = AppState::new(
                broker,
                Arc::new(order_repository),
                inventory_repository,
                Arc::new(notification_repository),
            );
            serve(config, state, metrics_handle).await;
        }
        None => {
            tracing::info!("DATABASE_URL not set, using in-memory stores");
            let state = AppState::new(
                broker,
                Arc::new(InMemoryOrderRepository::new()),
                InMemoryInventoryRepository::new(),
                Arc::new(InMemoryNotificationRepository::new()),
            );
            serve(config, state, metrics_handle).await;
        }
    }
}

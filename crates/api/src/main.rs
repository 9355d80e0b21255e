use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info};

use crm_webhooks_api::app::{create_app, AppState};
use crm_webhooks_api::config::Config;
use crm_webhooks_api::jobs::{JobScheduler, PoolMetricsJob, WebhookRetryJob};
use crm_webhooks_api::middleware::{init_metrics, logging::init_logging};
use crm_webhooks_api::services::{
    DeliveryQueue, DeliveryWorker, DeliveryWorkerPool, HttpWebhookTransport, WorkerSettings,
};
use persistence::repositories::{WebhookDeliveryRepository, WebhookEndpointRepository};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = Config::load()?;

    init_logging(&config.logging);
    init_metrics();

    info!("Starting CRM webhooks service v{}", env!("CARGO_PKG_VERSION"));

    let db_config = persistence::db::DatabaseConfig::from(&config.database);
    let pool = persistence::db::create_pool(&db_config).await?;

    info!("Running database migrations...");
    persistence::db::run_migrations(&pool).await?;
    info!("Migrations completed");

    let endpoints = Arc::new(WebhookEndpointRepository::new(pool.clone()));
    let deliveries = Arc::new(WebhookDeliveryRepository::new(pool.clone()));
    let transport = HttpWebhookTransport::new(config.webhooks.attempt_timeout())
        .context("Failed to build webhook HTTP client")?;

    let (queue, receiver) = DeliveryQueue::new(config.webhooks.queue_capacity);
    let worker = DeliveryWorker::new(
        endpoints.clone(),
        deliveries.clone(),
        Arc::new(transport),
        WorkerSettings {
            policy: config.webhooks.retry_policy(),
            claim_lease: config.webhooks.claim_lease(),
            skip_recheck: config.webhooks.skip_recheck(),
        },
    );

    let mut scheduler = JobScheduler::new();
    let worker_pool = DeliveryWorkerPool::new(
        Arc::new(worker),
        queue.clone(),
        config.webhooks.worker_concurrency,
    );
    let pool_handle = worker_pool.spawn(
        receiver,
        scheduler.shutdown_signal(),
        config.shutdown_timeout(),
    );
    scheduler.track(pool_handle);
    scheduler.register(WebhookRetryJob::new(
        deliveries.clone(),
        queue.clone(),
        config.webhooks.retry_policy(),
        config.webhooks.retry_poll_interval_secs,
        config.webhooks.retry_batch_size,
    ));
    scheduler.register(PoolMetricsJob::new(pool));
    scheduler.start();

    let addr = config.socket_addr()?;
    let shutdown_timeout = config.shutdown_timeout();
    let app = create_app(AppState::new(config, endpoints, deliveries, queue));

    info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown();
    scheduler.wait_for_shutdown(shutdown_timeout).await;
    info!("Server shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

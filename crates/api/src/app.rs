use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use domain::services::{WebhookDeliveryStore, WebhookEndpointStore};

use crate::config::Config;
use crate::middleware::{metrics_handler, metrics_middleware, trace_id};
use crate::routes::{health, webhook_deliveries, webhook_events, webhooks};
use crate::services::{DeliveryAudit, DeliveryQueue, WebhookDispatcher, WebhookRegistry};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<WebhookRegistry>,
    pub audit: Arc<DeliveryAudit>,
    /// In-process entry point for domain events raised by the rest of the CRM.
    pub dispatcher: WebhookDispatcher,
    pub endpoints: Arc<dyn WebhookEndpointStore>,
}

impl AppState {
    pub fn new(
        config: Config,
        endpoints: Arc<dyn WebhookEndpointStore>,
        deliveries: Arc<dyn WebhookDeliveryStore>,
        queue: DeliveryQueue,
    ) -> Self {
        let dispatcher =
            WebhookDispatcher::new(Arc::clone(&endpoints), Arc::clone(&deliveries), queue);
        let registry = WebhookRegistry::new(
            Arc::clone(&endpoints),
            Arc::clone(&deliveries),
            dispatcher.clone(),
            config.webhooks.max_endpoints_per_owner,
        );
        let audit = DeliveryAudit::new(Arc::clone(&endpoints), deliveries);

        Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
            audit: Arc::new(audit),
            dispatcher,
            endpoints,
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Tenant-scoped routes; the OwnerId extractor rejects calls without X-Owner-Id
    let webhook_routes = Router::new()
        .route(
            "/api/v1/webhooks",
            post(webhooks::create_webhook).get(webhooks::list_webhooks),
        )
        .route(
            "/api/v1/webhooks/:id",
            get(webhooks::get_webhook)
                .put(webhooks::update_webhook)
                .delete(webhooks::delete_webhook),
        )
        .route(
            "/api/v1/webhooks/:id/rotate-secret",
            post(webhooks::rotate_secret),
        )
        .route("/api/v1/webhooks/:id/test", post(webhooks::send_test))
        .route(
            "/api/v1/webhooks/:id/deliveries",
            get(webhook_deliveries::list_deliveries),
        )
        .route(
            "/api/v1/webhooks/:id/deliveries/stats",
            get(webhook_deliveries::delivery_stats),
        )
        .route(
            "/api/v1/webhook-deliveries/:id",
            get(webhook_deliveries::get_delivery),
        )
        .route(
            "/api/v1/webhook-deliveries/:id/redeliver",
            post(webhook_deliveries::redeliver),
        );

    let public_routes = Router::new()
        .route("/api/v1/webhook-events", get(webhook_events::list_event_types))
        .route("/api/health", get(health::health_check))
        .route("/api/health/live", get(health::live))
        .route("/metrics", get(metrics_handler));

    let request_timeout = Duration::from_secs(state.config.server.request_timeout_secs);

    Router::new()
        .merge(public_routes)
        .merge(webhook_routes)
        // Global middleware (order matters: bottom layers run first)
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_id))
        .layer(cors)
        .with_state(state)
}

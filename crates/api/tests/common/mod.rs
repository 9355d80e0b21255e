//! Common test utilities for integration tests.
//!
//! The app is wired over the in-memory stores, so these tests run without a
//! database. The queue receiver is kept so tests can observe what was
//! enqueued or hand it to a worker pool.

// Helper utilities are not used by every test.
#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request};
use axum::Router;
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use crm_webhooks_api::app::{create_app, AppState};
use crm_webhooks_api::config::Config;
use crm_webhooks_api::extractors::OWNER_ID_HEADER;
use crm_webhooks_api::services::DeliveryQueue;
use persistence::{InMemoryDeliveryStore, InMemoryEndpointStore};

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub endpoints: Arc<InMemoryEndpointStore>,
    pub deliveries: Arc<InMemoryDeliveryStore>,
    pub queue: DeliveryQueue,
    pub receiver: mpsc::Receiver<Uuid>,
}

pub fn test_config() -> Config {
    Config::load_for_test(&[("webhooks.max_endpoints_per_owner", "3")])
        .expect("test config should load")
}

pub fn create_test_app() -> TestApp {
    let endpoints = Arc::new(InMemoryEndpointStore::new());
    let deliveries = Arc::new(InMemoryDeliveryStore::new());
    let (queue, receiver) = DeliveryQueue::new(64);
    let state = AppState::new(
        test_config(),
        endpoints.clone(),
        deliveries.clone(),
        queue.clone(),
    );

    TestApp {
        router: create_app(state.clone()),
        state,
        endpoints,
        deliveries,
        queue,
        receiver,
    }
}

pub fn json_request(method: Method, uri: &str, owner_id: Uuid, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json")
        .header(OWNER_ID_HEADER, owner_id.to_string())
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn owner_request(method: Method, uri: &str, owner_id: Uuid) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(OWNER_ID_HEADER, owner_id.to_string())
        .body(Body::empty())
        .unwrap()
}

pub fn anonymous_request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub async fn parse_response_body(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap_or(Value::Null)
}

pub fn webhook_body(name: &str, events: &[&str]) -> Value {
    serde_json::json!({
        "name": name,
        "url": format!("https://hooks.example.com/{}", name.to_lowercase().replace(' ', "-")),
        "events": events,
    })
}

/// Creates an endpoint through the API and returns the response body.
pub async fn create_webhook(app: &TestApp, owner_id: Uuid, name: &str, events: &[&str]) -> Value {
    use tower::ServiceExt;

    let response = app
        .router
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/v1/webhooks",
            owner_id,
            webhook_body(name, events),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::CREATED);
    parse_response_body(response).await
}

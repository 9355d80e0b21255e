//! Integration tests for the webhook management API.
//!
//! Requests go through the full router (middleware, extractors, handlers)
//! over in-memory stores.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::http::{Method, StatusCode};
use chrono::Utc;
use common::{
    anonymous_request, create_test_app, create_webhook, json_request, owner_request,
    parse_response_body, webhook_body,
};
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;

use crm_webhooks_api::jobs::JobScheduler;
use crm_webhooks_api::services::{DeliveryWorker, DeliveryWorkerPool, WorkerSettings};
use domain::models::{DeliveryStatus, WebhookEventType, SIGNATURE_HEADER};
use domain::services::{MockWebhookTransport, WebhookDeliveryStore, WebhookEndpointStore};

// ============================================================================
// Tenant identity
// ============================================================================

#[tokio::test]
async fn test_missing_owner_header_is_unauthorized() {
    let app = create_test_app();

    let response = app
        .router
        .clone()
        .oneshot(anonymous_request(Method::GET, "/api/v1/webhooks"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = parse_response_body(response).await;
    assert_eq!(body["error"], "unauthorized");
}

#[tokio::test]
async fn test_invalid_owner_header_is_unauthorized() {
    let app = create_test_app();
    let request = axum::http::Request::builder()
        .uri("/api/v1/webhooks")
        .header("X-Owner-Id", "not-a-uuid")
        .body(axum::body::Body::empty())
        .unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// ============================================================================
// Endpoint management
// ============================================================================

#[tokio::test]
async fn test_create_webhook_returns_secret_once() {
    let app = create_test_app();
    let owner = Uuid::new_v4();

    let created = create_webhook(&app, owner, "Billing Sync", &["invoice.paid", "invoice.sent"]).await;
    assert_eq!(created["name"], "Billing Sync");
    assert_eq!(created["url"], "https://hooks.example.com/billing-sync");
    assert_eq!(created["is_active"], true);
    assert_eq!(created["events"], json!(["invoice.sent", "invoice.paid"]));
    assert!(created["secret"].as_str().unwrap().starts_with("whsec_"));

    let id = created["id"].as_str().unwrap();
    let response = app
        .router
        .clone()
        .oneshot(owner_request(Method::GET, &format!("/api/v1/webhooks/{}", id), owner))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let fetched = parse_response_body(response).await;
    assert_eq!(fetched["id"], created["id"]);
    assert!(fetched.get("secret").is_none());

    let response = app
        .router
        .clone()
        .oneshot(owner_request(Method::GET, "/api/v1/webhooks", owner))
        .await
        .unwrap();
    let listed = parse_response_body(response).await;
    assert_eq!(listed["total"], 1);
    assert!(listed["webhooks"][0].get("secret").is_none());
}

#[tokio::test]
async fn test_create_webhook_rejects_invalid_input() {
    let app = create_test_app();
    let owner = Uuid::new_v4();

    let cases = [
        json!({"name": "Plain", "url": "http://hooks.example.com/x", "events": ["invoice.paid"]}),
        json!({"name": "Unknown", "url": "https://hooks.example.com/x", "events": ["invoice.deleted"]}),
        json!({"name": "Reserved", "url": "https://hooks.example.com/x", "events": ["webhook.test"]}),
        json!({"name": "Empty", "url": "https://hooks.example.com/x", "events": []}),
        json!({"name": "   ", "url": "https://hooks.example.com/x", "events": ["invoice.paid"]}),
    ];

    for body in cases {
        let response = app
            .router
            .clone()
            .oneshot(json_request(Method::POST, "/api/v1/webhooks", owner, body.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {}", body);
    }
}

#[tokio::test]
async fn test_create_webhook_duplicate_name_conflicts() {
    let app = create_test_app();
    let owner = Uuid::new_v4();
    create_webhook(&app, owner, "Zapier", &["lead.created"]).await;

    let response = app
        .router
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/v1/webhooks",
            owner,
            webhook_body("Zapier", &["lead.converted"]),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // Names are scoped per tenant.
    create_webhook(&app, Uuid::new_v4(), "Zapier", &["lead.created"]).await;
}

#[tokio::test]
async fn test_create_webhook_enforces_per_owner_limit() {
    let app = create_test_app();
    let owner = Uuid::new_v4();
    for name in ["One", "Two", "Three"] {
        create_webhook(&app, owner, name, &["client.created"]).await;
    }

    let response = app
        .router
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/v1/webhooks",
            owner,
            webhook_body("Four", &["client.created"]),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_other_tenant_sees_not_found() {
    let app = create_test_app();
    let owner = Uuid::new_v4();
    let intruder = Uuid::new_v4();
    let created = create_webhook(&app, owner, "Private", &["quote.accepted"]).await;
    let id = created["id"].as_str().unwrap();

    let requests = [
        owner_request(Method::GET, &format!("/api/v1/webhooks/{}", id), intruder),
        json_request(
            Method::PUT,
            &format!("/api/v1/webhooks/{}", id),
            intruder,
            json!({"name": "Mine now"}),
        ),
        owner_request(Method::DELETE, &format!("/api/v1/webhooks/{}", id), intruder),
        owner_request(Method::POST, &format!("/api/v1/webhooks/{}/rotate-secret", id), intruder),
        owner_request(Method::POST, &format!("/api/v1/webhooks/{}/test", id), intruder),
        owner_request(Method::GET, &format!("/api/v1/webhooks/{}/deliveries", id), intruder),
        owner_request(Method::GET, &format!("/api/v1/webhooks/{}/deliveries/stats", id), intruder),
    ];

    for request in requests {
        let uri = request.uri().to_string();
        let response = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "uri: {}", uri);
    }

    let response = app
        .router
        .clone()
        .oneshot(owner_request(Method::GET, "/api/v1/webhooks", intruder))
        .await
        .unwrap();
    assert_eq!(parse_response_body(response).await["total"], 0);
}

#[tokio::test]
async fn test_update_webhook() {
    let app = create_test_app();
    let owner = Uuid::new_v4();
    let created = create_webhook(&app, owner, "Ops", &["project.completed"]).await;
    let uri = format!("/api/v1/webhooks/{}", created["id"].as_str().unwrap());

    let response = app
        .router
        .clone()
        .oneshot(json_request(
            Method::PUT,
            &uri,
            owner,
            json!({"is_active": false, "events": ["expense.created"]}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let updated = parse_response_body(response).await;
    assert_eq!(updated["is_active"], false);
    assert_eq!(updated["events"], json!(["expense.created"]));
    assert_eq!(updated["name"], "Ops");

    let response = app
        .router
        .clone()
        .oneshot(json_request(Method::PUT, &uri, owner, json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_rotate_secret_replaces_secret() {
    let app = create_test_app();
    let owner = Uuid::new_v4();
    let created = create_webhook(&app, owner, "Rotating", &["invoice.created"]).await;
    let id = created["id"].as_str().unwrap();

    let response = app
        .router
        .clone()
        .oneshot(owner_request(
            Method::POST,
            &format!("/api/v1/webhooks/{}/rotate-secret", id),
            owner,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let rotated = parse_response_body(response).await;
    assert_eq!(rotated["id"], created["id"]);
    assert_ne!(rotated["secret"], created["secret"]);

    let stored = app
        .endpoints
        .find_for_owner(owner, Uuid::parse_str(id).unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(json!(stored.secret), rotated["secret"]);
}

#[tokio::test]
async fn test_delete_webhook() {
    let app = create_test_app();
    let owner = Uuid::new_v4();
    let created = create_webhook(&app, owner, "Short lived", &["client.created"]).await;
    let uri = format!("/api/v1/webhooks/{}", created["id"].as_str().unwrap());

    let response = app
        .router
        .clone()
        .oneshot(owner_request(Method::DELETE, &uri, owner))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .router
        .clone()
        .oneshot(owner_request(Method::GET, &uri, owner))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_deliveries_remain_listable_after_delete() {
    let app = create_test_app();
    let owner = Uuid::new_v4();
    let created = create_webhook(&app, owner, "Retired", &["invoice.paid"]).await;
    let uri = format!("/api/v1/webhooks/{}", created["id"].as_str().unwrap());

    let response = app
        .router
        .clone()
        .oneshot(owner_request(Method::POST, &format!("{}/test", uri), owner))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let response = app
        .router
        .clone()
        .oneshot(owner_request(Method::DELETE, &uri, owner))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .router
        .clone()
        .oneshot(owner_request(Method::GET, &format!("{}/deliveries", uri), owner))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let page = parse_response_body(response).await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["deliveries"][0]["event"], "webhook.test");

    let response = app
        .router
        .clone()
        .oneshot(owner_request(
            Method::GET,
            &format!("{}/deliveries", uri),
            Uuid::new_v4(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ============================================================================
// Test sends and delivery history
// ============================================================================

#[tokio::test]
async fn test_send_test_queues_delivery() {
    let mut app = create_test_app();
    let owner = Uuid::new_v4();
    let created = create_webhook(&app, owner, "Tester", &["invoice.overdue"]).await;
    let id = created["id"].as_str().unwrap();

    let response = app
        .router
        .clone()
        .oneshot(owner_request(Method::POST, &format!("/api/v1/webhooks/{}/test", id), owner))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let queued = parse_response_body(response).await;
    assert_eq!(queued["event"], "webhook.test");
    assert_eq!(queued["status"], "pending");

    let enqueued = app.receiver.try_recv().unwrap();
    assert_eq!(json!(enqueued.to_string()), queued["delivery_id"]);

    let response = app
        .router
        .clone()
        .oneshot(owner_request(
            Method::GET,
            &format!("/api/v1/webhooks/{}/deliveries", id),
            owner,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let page = parse_response_body(response).await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["limit"], 20);
    assert_eq!(page["offset"], 0);
    assert_eq!(page["deliveries"][0]["attempt_count"], 0);
    assert_eq!(page["deliveries"][0]["payload"]["event"], "webhook.test");
}

#[tokio::test]
async fn test_send_test_rejects_inactive_webhook() {
    let app = create_test_app();
    let owner = Uuid::new_v4();
    let created = create_webhook(&app, owner, "Paused", &["invoice.paid"]).await;
    let id = created["id"].as_str().unwrap();

    app.router
        .clone()
        .oneshot(json_request(
            Method::PUT,
            &format!("/api/v1/webhooks/{}", id),
            owner,
            json!({"is_active": false}),
        ))
        .await
        .unwrap();

    let response = app
        .router
        .clone()
        .oneshot(owner_request(Method::POST, &format!("/api/v1/webhooks/{}/test", id), owner))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_dispatch_creates_deliveries_for_subscribers_only() {
    let app = create_test_app();
    let owner = Uuid::new_v4();
    let paid = create_webhook(&app, owner, "Paid", &["invoice.paid"]).await;
    create_webhook(&app, owner, "Leads", &["lead.created"]).await;
    create_webhook(&app, Uuid::new_v4(), "Elsewhere", &["invoice.paid"]).await;

    let ids = app
        .state
        .dispatcher
        .dispatch(owner, WebhookEventType::InvoicePaid, json!({"invoice_id": "INV-7"}))
        .await
        .unwrap();
    assert_eq!(ids.len(), 1);

    let uri = format!("/api/v1/webhooks/{}/deliveries/stats", paid["id"].as_str().unwrap());
    let response = app
        .router
        .clone()
        .oneshot(owner_request(Method::GET, &uri, owner))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let stats = parse_response_body(response).await;
    assert_eq!(stats, json!({"pending": 1, "delivered": 0, "failed": 0}));

    let response = app
        .router
        .clone()
        .oneshot(owner_request(
            Method::GET,
            &format!("/api/v1/webhook-deliveries/{}", ids[0]),
            owner,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let delivery = parse_response_body(response).await;
    assert_eq!(delivery["event"], "invoice.paid");
    assert_eq!(delivery["payload"]["data"]["invoice_id"], "INV-7");

    let response = app
        .router
        .clone()
        .oneshot(owner_request(
            Method::GET,
            &format!("/api/v1/webhook-deliveries/{}", ids[0]),
            Uuid::new_v4(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_deliveries_validates_query() {
    let app = create_test_app();
    let owner = Uuid::new_v4();
    let created = create_webhook(&app, owner, "Paged", &["quote.sent"]).await;
    let id = created["id"].as_str().unwrap();

    for query in ["limit=0", "limit=101", "status=bounced"] {
        let response = app
            .router
            .clone()
            .oneshot(owner_request(
                Method::GET,
                &format!("/api/v1/webhooks/{}/deliveries?{}", id, query),
                owner,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "query: {}", query);
    }

    let response = app
        .router
        .clone()
        .oneshot(owner_request(
            Method::GET,
            &format!("/api/v1/webhooks/{}/deliveries?status=failed&limit=5", id),
            owner,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let page = parse_response_body(response).await;
    assert_eq!(page["limit"], 5);
    assert_eq!(page["total"], 0);
}

#[tokio::test]
async fn test_redeliver_only_terminal_deliveries() {
    let app = create_test_app();
    let owner = Uuid::new_v4();
    create_webhook(&app, owner, "Redo", &["invoice.sent"]).await;
    let ids = app
        .state
        .dispatcher
        .dispatch(owner, WebhookEventType::InvoiceSent, json!({"invoice_id": "INV-9"}))
        .await
        .unwrap();
    let uri = format!("/api/v1/webhook-deliveries/{}/redeliver", ids[0]);

    let response = app
        .router
        .clone()
        .oneshot(owner_request(Method::POST, &uri, owner))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let mut failed = app.deliveries.find_by_id(ids[0]).await.unwrap().unwrap();
    failed.attempt_count = 5;
    failed.failed_at = Some(Utc::now());
    app.deliveries.put(failed.clone()).await;

    let response = app
        .router
        .clone()
        .oneshot(owner_request(Method::POST, &uri, owner))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let queued = parse_response_body(response).await;
    assert_ne!(queued["delivery_id"], json!(ids[0].to_string()));
    assert_eq!(queued["event"], "invoice.sent");

    // The original row keeps its terminal state.
    let original = app.deliveries.find_by_id(ids[0]).await.unwrap().unwrap();
    assert_eq!(original.status(), DeliveryStatus::Failed);
    assert_eq!(original.attempt_count, 5);
}

// ============================================================================
// Delivery pipeline
// ============================================================================

#[tokio::test]
async fn test_dispatched_event_is_delivered_by_worker_pool() {
    let app = create_test_app();
    let owner = Uuid::new_v4();
    let created = create_webhook(&app, owner, "Live", &["client.created"]).await;
    let secret = created["secret"].as_str().unwrap().to_string();

    let transport = Arc::new(MockWebhookTransport::new());
    let worker = DeliveryWorker::new(
        app.endpoints.clone(),
        app.deliveries.clone(),
        transport.clone(),
        WorkerSettings::default(),
    );
    let mut scheduler = JobScheduler::new();
    let pool = DeliveryWorkerPool::new(Arc::new(worker), app.queue.clone(), 2);
    let handle = pool.spawn(app.receiver, scheduler.shutdown_signal(), Duration::from_secs(5));
    scheduler.track(handle);

    let ids = app
        .state
        .dispatcher
        .dispatch(owner, WebhookEventType::ClientCreated, json!({"client_id": 42}))
        .await
        .unwrap();

    let mut delivered = None;
    for _ in 0..100 {
        let row = app.deliveries.find_by_id(ids[0]).await.unwrap().unwrap();
        if row.status() == DeliveryStatus::Delivered {
            delivered = Some(row);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    scheduler.shutdown();
    scheduler.wait_for_shutdown(Duration::from_secs(5)).await;

    let delivered = delivered.expect("delivery should complete");
    assert_eq!(delivered.attempt_count, 1);
    assert_eq!(delivered.last_response_code, Some(200));

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    let signature = requests[0].header(SIGNATURE_HEADER).unwrap();
    shared::crypto::verify_signature(&secret, &requests[0].body, signature).unwrap();
}

// ============================================================================
// Public routes
// ============================================================================

#[tokio::test]
async fn test_list_event_types_is_public() {
    let app = create_test_app();

    let response = app
        .router
        .clone()
        .oneshot(anonymous_request(Method::GET, "/api/v1/webhook-events"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = parse_response_body(response).await;
    assert_eq!(body["events"].as_array().unwrap().len(), 12);
}

#[tokio::test]
async fn test_health_endpoints() {
    let app = create_test_app();

    let response = app
        .router
        .clone()
        .oneshot(anonymous_request(Method::GET, "/api/health"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = parse_response_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"]["connected"], true);

    let response = app
        .router
        .clone()
        .oneshot(anonymous_request(Method::GET, "/api/health/live"))
        .await
        .unwrap();
    assert_eq!(parse_response_body(response).await["status"], "alive");
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let app = create_test_app();
    let request = axum::http::Request::builder()
        .uri("/api/health/live")
        .header("x-request-id", "req-123")
        .body(axum::body::Body::empty())
        .unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.headers()["x-request-id"], "req-123");
}

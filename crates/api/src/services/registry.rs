//! Endpoint registry: tenant-scoped management of webhook endpoints.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use domain::models::{
    CreateWebhookEndpointRequest, NewWebhookEndpoint, RotateSecretResponse,
    UpdateWebhookEndpointRequest, WebhookDelivery, WebhookEndpoint, WebhookEventType,
};
use domain::services::{StoreError, WebhookDeliveryStore, WebhookEndpointStore};
use shared::crypto::generate_webhook_secret;

use super::dispatcher::WebhookDispatcher;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("{0}")]
    Validation(String),

    #[error("Invalid request")]
    InvalidFields(#[from] validator::ValidationErrors),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for RegistryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(_) => RegistryError::Conflict(
                "A webhook with this name already exists".to_string(),
            ),
            other => RegistryError::Store(other),
        }
    }
}

pub struct WebhookRegistry {
    endpoints: Arc<dyn WebhookEndpointStore>,
    deliveries: Arc<dyn WebhookDeliveryStore>,
    dispatcher: WebhookDispatcher,
    max_endpoints_per_owner: i64,
}

impl WebhookRegistry {
    pub fn new(
        endpoints: Arc<dyn WebhookEndpointStore>,
        deliveries: Arc<dyn WebhookDeliveryStore>,
        dispatcher: WebhookDispatcher,
        max_endpoints_per_owner: i64,
    ) -> Self {
        Self {
            endpoints,
            deliveries,
            dispatcher,
            max_endpoints_per_owner,
        }
    }

    /// Registers an endpoint with a freshly generated secret.
    ///
    /// The returned endpoint carries the plaintext secret; it is the only
    /// place besides rotation where the caller gets to see it.
    pub async fn create(
        &self,
        owner_id: Uuid,
        request: CreateWebhookEndpointRequest,
    ) -> Result<WebhookEndpoint, RegistryError> {
        request.validate()?;
        let subscribed_events = request
            .subscribed_events()
            .map_err(RegistryError::Validation)?;

        let count = self.endpoints.count_by_owner(owner_id).await?;
        if count >= self.max_endpoints_per_owner {
            return Err(RegistryError::Conflict(format!(
                "Maximum number of webhooks reached ({})",
                self.max_endpoints_per_owner
            )));
        }

        let name = request.name.trim().to_string();
        self.ensure_name_available(owner_id, &name, None).await?;

        let endpoint = self
            .endpoints
            .insert(NewWebhookEndpoint {
                owner_id,
                name,
                url: request.url,
                secret: generate_webhook_secret(),
                subscribed_events,
                is_active: request.is_active,
            })
            .await?;

        info!(
            owner_id = %owner_id,
            endpoint_id = %endpoint.id,
            events = endpoint.subscribed_events.len(),
            "Webhook endpoint created"
        );
        Ok(endpoint)
    }

    pub async fn list(&self, owner_id: Uuid) -> Result<Vec<WebhookEndpoint>, RegistryError> {
        Ok(self.endpoints.list_by_owner(owner_id).await?)
    }

    pub async fn get(&self, owner_id: Uuid, id: Uuid) -> Result<WebhookEndpoint, RegistryError> {
        self.endpoints
            .find_for_owner(owner_id, id)
            .await?
            .ok_or(RegistryError::NotFound("Webhook"))
    }

    /// Applies a partial update. At least one field must be present.
    pub async fn update(
        &self,
        owner_id: Uuid,
        id: Uuid,
        request: UpdateWebhookEndpointRequest,
    ) -> Result<WebhookEndpoint, RegistryError> {
        if !request.has_updates() {
            return Err(RegistryError::Validation(
                "At least one field must be provided".to_string(),
            ));
        }
        request.validate()?;
        let mut patch = request.to_patch().map_err(RegistryError::Validation)?;

        // Ownership first so another tenant's id is reported as missing.
        self.get(owner_id, id).await?;

        if let Some(name) = patch.name.as_mut() {
            *name = name.trim().to_string();
            self.ensure_name_available(owner_id, name, Some(id)).await?;
        }

        let endpoint = self
            .endpoints
            .update(owner_id, id, &patch)
            .await?
            .ok_or(RegistryError::NotFound("Webhook"))?;

        info!(owner_id = %owner_id, endpoint_id = %id, "Webhook endpoint updated");
        Ok(endpoint)
    }

    /// Replaces the signing secret and returns the new one once.
    pub async fn rotate_secret(
        &self,
        owner_id: Uuid,
        id: Uuid,
    ) -> Result<RotateSecretResponse, RegistryError> {
        let secret = generate_webhook_secret();
        let endpoint = self
            .endpoints
            .rotate_secret(owner_id, id, &secret)
            .await?
            .ok_or(RegistryError::NotFound("Webhook"))?;

        info!(owner_id = %owner_id, endpoint_id = %id, "Webhook secret rotated");
        Ok(RotateSecretResponse {
            id: endpoint.id,
            secret,
            rotated_at: endpoint.updated_at,
        })
    }

    /// Hard-deletes the endpoint. Its deliveries stay for audit.
    pub async fn delete(&self, owner_id: Uuid, id: Uuid) -> Result<(), RegistryError> {
        if !self.endpoints.delete(owner_id, id).await? {
            return Err(RegistryError::NotFound("Webhook"));
        }
        info!(owner_id = %owner_id, endpoint_id = %id, "Webhook endpoint deleted");
        Ok(())
    }

    /// Queues a `webhook.test` delivery for one endpoint, whatever it is
    /// subscribed to, through the regular worker path.
    pub async fn send_test(
        &self,
        owner_id: Uuid,
        id: Uuid,
    ) -> Result<WebhookDelivery, RegistryError> {
        let endpoint = self.get(owner_id, id).await?;
        if !endpoint.is_active {
            return Err(RegistryError::Validation(
                "Cannot send a test to an inactive webhook".to_string(),
            ));
        }

        let data = json!({
            "message": "This is a test webhook delivery",
            "webhook_id": endpoint.id,
            "webhook_name": endpoint.name,
            "sent_at": Utc::now(),
        });
        let delivery = self
            .dispatcher
            .dispatch_to_endpoint(&endpoint, WebhookEventType::Test, data)
            .await?;

        info!(
            owner_id = %owner_id,
            endpoint_id = %id,
            delivery_id = %delivery.id,
            "Webhook test delivery queued"
        );
        Ok(delivery)
    }

    /// Queues a copy of a terminal delivery. Pending deliveries are still
    /// being retried and cannot be redelivered.
    pub async fn redeliver(
        &self,
        owner_id: Uuid,
        delivery_id: Uuid,
    ) -> Result<WebhookDelivery, RegistryError> {
        let original = self
            .deliveries
            .find_for_owner(owner_id, delivery_id)
            .await?
            .ok_or(RegistryError::NotFound("Delivery"))?;

        if !original.status().is_terminal() {
            return Err(RegistryError::Conflict(
                "Delivery is still pending".to_string(),
            ));
        }

        Ok(self.dispatcher.requeue(&original).await?)
    }

    async fn ensure_name_available(
        &self,
        owner_id: Uuid,
        name: &str,
        except: Option<Uuid>,
    ) -> Result<(), RegistryError> {
        match self.endpoints.find_by_owner_and_name(owner_id, name).await? {
            Some(existing) if Some(existing.id) != except => Err(RegistryError::Conflict(
                "A webhook with this name already exists".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::delivery_queue::DeliveryQueue;
    use domain::models::DeliveryStatus;
    use persistence::{InMemoryDeliveryStore, InMemoryEndpointStore};
    use shared::crypto::WEBHOOK_SECRET_PREFIX;
    use tokio::sync::mpsc;

    struct Fixture {
        endpoints: Arc<InMemoryEndpointStore>,
        deliveries: Arc<InMemoryDeliveryStore>,
        registry: WebhookRegistry,
        receiver: mpsc::Receiver<Uuid>,
    }

    fn fixture(max_endpoints: i64) -> Fixture {
        let endpoints = Arc::new(InMemoryEndpointStore::new());
        let deliveries = Arc::new(InMemoryDeliveryStore::new());
        let (queue, receiver) = DeliveryQueue::new(16);
        let dispatcher = WebhookDispatcher::new(endpoints.clone(), deliveries.clone(), queue);
        let registry =
            WebhookRegistry::new(endpoints.clone(), deliveries.clone(), dispatcher, max_endpoints);
        Fixture {
            endpoints,
            deliveries,
            registry,
            receiver,
        }
    }

    fn create_request(name: &str, events: &[&str]) -> CreateWebhookEndpointRequest {
        CreateWebhookEndpointRequest {
            name: name.to_string(),
            url: "https://hooks.example.com/crm".to_string(),
            events: events.iter().map(|e| e.to_string()).collect(),
            is_active: true,
        }
    }

    #[tokio::test]
    async fn test_create_generates_secret() {
        let f = fixture(25);
        let owner = Uuid::new_v4();

        let endpoint = f
            .registry
            .create(owner, create_request("Accounting", &["invoice.paid", "invoice.sent"]))
            .await
            .unwrap();

        assert_eq!(endpoint.owner_id, owner);
        assert!(endpoint.secret.starts_with(WEBHOOK_SECRET_PREFIX));
        assert_eq!(
            endpoint.subscribed_events,
            vec![WebhookEventType::InvoiceSent, WebhookEventType::InvoicePaid]
        );
        assert!(endpoint.last_triggered_at.is_none());
    }

    #[tokio::test]
    async fn test_create_rejects_http_url() {
        let f = fixture(25);
        let mut request = create_request("Accounting", &["invoice.paid"]);
        request.url = "http://hooks.example.com/crm".to_string();

        let err = f.registry.create(Uuid::new_v4(), request).await.unwrap_err();
        assert!(matches!(err, RegistryError::InvalidFields(_)));
    }

    #[tokio::test]
    async fn test_create_rejects_empty_and_unknown_events() {
        let f = fixture(25);
        let owner = Uuid::new_v4();

        let err = f.registry.create(owner, create_request("a", &[])).await.unwrap_err();
        assert!(matches!(err, RegistryError::InvalidFields(_)));

        let err = f
            .registry
            .create(owner, create_request("b", &["invoice.deleted"]))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Validation(ref m) if m.contains("invoice.deleted")));

        let err = f
            .registry
            .create(owner, create_request("c", &["webhook.test"]))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Validation(_)));
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_name_per_owner() {
        let f = fixture(25);
        let owner = Uuid::new_v4();
        f.registry
            .create(owner, create_request("Zapier", &["lead.created"]))
            .await
            .unwrap();

        let err = f
            .registry
            .create(owner, create_request("Zapier", &["lead.created"]))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Conflict(_)));

        // Same name under another tenant is fine.
        assert!(f
            .registry
            .create(Uuid::new_v4(), create_request("Zapier", &["lead.created"]))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_create_enforces_endpoint_limit() {
        let f = fixture(2);
        let owner = Uuid::new_v4();
        for name in ["one", "two"] {
            f.registry
                .create(owner, create_request(name, &["lead.created"]))
                .await
                .unwrap();
        }

        let err = f
            .registry
            .create(owner, create_request("three", &["lead.created"]))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Conflict(ref m) if m.contains("Maximum")));
    }

    #[tokio::test]
    async fn test_get_is_owner_scoped() {
        let f = fixture(25);
        let owner = Uuid::new_v4();
        let endpoint = f
            .registry
            .create(owner, create_request("Scoped", &["quote.sent"]))
            .await
            .unwrap();

        assert!(f.registry.get(owner, endpoint.id).await.is_ok());
        assert!(matches!(
            f.registry.get(Uuid::new_v4(), endpoint.id).await,
            Err(RegistryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_partial() {
        let f = fixture(25);
        let owner = Uuid::new_v4();
        let endpoint = f
            .registry
            .create(owner, create_request("Before", &["quote.sent"]))
            .await
            .unwrap();

        let updated = f
            .registry
            .update(
                owner,
                endpoint.id,
                UpdateWebhookEndpointRequest {
                    name: Some("After".to_string()),
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.name, "After");
        assert!(!updated.is_active);
        assert_eq!(updated.url, endpoint.url);
        assert_eq!(updated.secret, endpoint.secret);
        assert_eq!(updated.subscribed_events, endpoint.subscribed_events);
    }

    #[tokio::test]
    async fn test_update_requires_fields() {
        let f = fixture(25);
        let owner = Uuid::new_v4();
        let endpoint = f
            .registry
            .create(owner, create_request("Empty", &["quote.sent"]))
            .await
            .unwrap();

        let err = f
            .registry
            .update(owner, endpoint.id, UpdateWebhookEndpointRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Validation(_)));
    }

    #[tokio::test]
    async fn test_update_rejects_empty_events() {
        let f = fixture(25);
        let owner = Uuid::new_v4();
        let endpoint = f
            .registry
            .create(owner, create_request("Events", &["quote.sent"]))
            .await
            .unwrap();

        let err = f
            .registry
            .update(
                owner,
                endpoint.id,
                UpdateWebhookEndpointRequest {
                    events: Some(vec![]),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Validation(_)));
    }

    #[tokio::test]
    async fn test_update_keeping_own_name_is_allowed() {
        let f = fixture(25);
        let owner = Uuid::new_v4();
        let endpoint = f
            .registry
            .create(owner, create_request("Same", &["quote.sent"]))
            .await
            .unwrap();

        let updated = f
            .registry
            .update(
                owner,
                endpoint.id,
                UpdateWebhookEndpointRequest {
                    name: Some("Same".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Same");
    }

    #[tokio::test]
    async fn test_update_other_owner_not_found() {
        let f = fixture(25);
        let endpoint = f
            .registry
            .create(Uuid::new_v4(), create_request("Mine", &["quote.sent"]))
            .await
            .unwrap();

        let err = f
            .registry
            .update(
                Uuid::new_v4(),
                endpoint.id,
                UpdateWebhookEndpointRequest {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_rotate_secret() {
        let f = fixture(25);
        let owner = Uuid::new_v4();
        let endpoint = f
            .registry
            .create(owner, create_request("Rotate", &["quote.sent"]))
            .await
            .unwrap();

        let rotated = f.registry.rotate_secret(owner, endpoint.id).await.unwrap();
        assert_ne!(rotated.secret, endpoint.secret);
        assert!(rotated.secret.starts_with(WEBHOOK_SECRET_PREFIX));

        let stored = f.registry.get(owner, endpoint.id).await.unwrap();
        assert_eq!(stored.secret, rotated.secret);

        assert!(matches!(
            f.registry.rotate_secret(Uuid::new_v4(), endpoint.id).await,
            Err(RegistryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_keeps_deliveries() {
        let f = fixture(25);
        let owner = Uuid::new_v4();
        let endpoint = f
            .registry
            .create(owner, create_request("Delete", &["quote.sent"]))
            .await
            .unwrap();
        f.registry.send_test(owner, endpoint.id).await.unwrap();

        f.registry.delete(owner, endpoint.id).await.unwrap();

        assert!(matches!(
            f.registry.get(owner, endpoint.id).await,
            Err(RegistryError::NotFound(_))
        ));
        assert_eq!(f.deliveries.all().await.len(), 1);
        assert!(matches!(
            f.registry.delete(owner, endpoint.id).await,
            Err(RegistryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_send_test_ignores_subscriptions() {
        let mut f = fixture(25);
        let owner = Uuid::new_v4();
        let endpoint = f
            .registry
            .create(owner, create_request("Test", &["project.completed"]))
            .await
            .unwrap();

        let delivery = f.registry.send_test(owner, endpoint.id).await.unwrap();

        assert_eq!(delivery.endpoint_id, endpoint.id);
        assert_eq!(delivery.event_name, "webhook.test");
        assert_eq!(delivery.status(), DeliveryStatus::Pending);
        assert_eq!(delivery.payload["data"]["webhook_id"], endpoint.id.to_string());
        assert_eq!(f.receiver.recv().await, Some(delivery.id));
    }

    #[tokio::test]
    async fn test_send_test_without_subscriptions_is_delivered() {
        use crate::services::{AttemptOutcome, DeliveryWorker, WorkerSettings};
        use domain::services::MockWebhookTransport;

        let mut f = fixture(25);
        let owner = Uuid::new_v4();
        // Not creatable through the registry, which requires at least one event
        let endpoint = f
            .endpoints
            .insert(NewWebhookEndpoint {
                owner_id: owner,
                name: "Silent".to_string(),
                url: "https://hooks.example.com/crm".to_string(),
                secret: "whsec_silent".to_string(),
                subscribed_events: vec![],
                is_active: true,
            })
            .await
            .unwrap();

        let delivery = f.registry.send_test(owner, endpoint.id).await.unwrap();
        assert_eq!(delivery.event_name, "webhook.test");
        assert_eq!(f.receiver.recv().await, Some(delivery.id));

        let transport = Arc::new(MockWebhookTransport::new());
        let worker = DeliveryWorker::new(
            f.endpoints.clone(),
            f.deliveries.clone(),
            transport.clone(),
            WorkerSettings::default(),
        );
        let outcome = worker.process(delivery.id).await.unwrap();

        assert_eq!(outcome, AttemptOutcome::Delivered { attempt_count: 1 });
        assert_eq!(transport.request_count(), 1);
        assert_eq!(transport.requests()[0].url, "https://hooks.example.com/crm");
        let row = f.deliveries.find_by_id(delivery.id).await.unwrap().unwrap();
        assert_eq!(row.status(), DeliveryStatus::Delivered);
    }

    #[tokio::test]
    async fn test_send_test_rejects_inactive_endpoint() {
        let f = fixture(25);
        let owner = Uuid::new_v4();
        let mut request = create_request("Inactive", &["quote.sent"]);
        request.is_active = false;
        let endpoint = f.registry.create(owner, request).await.unwrap();

        let err = f.registry.send_test(owner, endpoint.id).await.unwrap_err();
        assert!(matches!(err, RegistryError::Validation(_)));
        assert!(f.deliveries.all().await.is_empty());
    }

    #[tokio::test]
    async fn test_redeliver_terminal_only() {
        let f = fixture(25);
        let owner = Uuid::new_v4();
        let endpoint = f
            .registry
            .create(owner, create_request("Redeliver", &["quote.sent"]))
            .await
            .unwrap();
        let pending = f.registry.send_test(owner, endpoint.id).await.unwrap();

        let err = f.registry.redeliver(owner, pending.id).await.unwrap_err();
        assert!(matches!(err, RegistryError::Conflict(_)));

        let mut failed = pending.clone();
        failed.failed_at = Some(Utc::now());
        failed.attempt_count = 5;
        f.deliveries.put(failed.clone()).await;

        let copy = f.registry.redeliver(owner, pending.id).await.unwrap();
        assert_ne!(copy.id, pending.id);
        assert_eq!(copy.attempt_count, 0);
        assert_eq!(copy.payload, pending.payload);

        let original = f.deliveries.find_by_id(pending.id).await.unwrap().unwrap();
        assert_eq!(original, failed);

        assert!(matches!(
            f.registry.redeliver(Uuid::new_v4(), pending.id).await,
            Err(RegistryError::NotFound(_))
        ));
    }
}

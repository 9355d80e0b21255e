//! Fan-out of domain events into pending deliveries.

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use domain::models::{
    NewDelivery, WebhookDelivery, WebhookEndpoint, WebhookEventType, WebhookPayload,
};
use domain::services::{StoreError, WebhookDeliveryStore, WebhookEndpointStore};

use super::delivery_queue::DeliveryQueue;
use crate::middleware::metrics::record_deliveries_created;

/// Creates delivery rows for events and hands them to the worker pool.
///
/// Rows are written before `dispatch` returns; attempts happen later.
#[derive(Clone)]
pub struct WebhookDispatcher {
    endpoints: Arc<dyn WebhookEndpointStore>,
    deliveries: Arc<dyn WebhookDeliveryStore>,
    queue: DeliveryQueue,
}

impl WebhookDispatcher {
    pub fn new(
        endpoints: Arc<dyn WebhookEndpointStore>,
        deliveries: Arc<dyn WebhookDeliveryStore>,
        queue: DeliveryQueue,
    ) -> Self {
        Self {
            endpoints,
            deliveries,
            queue,
        }
    }

    /// Creates one pending delivery per active endpoint of `owner_id`
    /// subscribed to `event`. No matching endpoint is not an error.
    ///
    /// Returns the ids of the created deliveries.
    pub async fn dispatch(
        &self,
        owner_id: Uuid,
        event: WebhookEventType,
        data: serde_json::Value,
    ) -> Result<Vec<Uuid>, StoreError> {
        let endpoints = self.endpoints.find_active_subscribed(owner_id, event).await?;
        if endpoints.is_empty() {
            debug!(owner_id = %owner_id, event = %event, "No webhook endpoints subscribed");
            return Ok(Vec::new());
        }

        let payload = serde_json::to_value(WebhookPayload::new(owner_id, event, data))?;
        let rows = endpoints
            .iter()
            .filter(|endpoint| endpoint.accepts(event))
            .map(|endpoint| NewDelivery {
                endpoint_id: endpoint.id,
                owner_id,
                event_name: event.as_str().to_string(),
                payload: payload.clone(),
            })
            .collect();

        let created = self.deliveries.insert_many(rows).await?;
        record_deliveries_created(event.as_str(), created.len());

        info!(
            owner_id = %owner_id,
            event = %event,
            deliveries = created.len(),
            "Webhook event dispatched"
        );

        Ok(self.enqueue_all(&created))
    }

    /// Creates a delivery of `event` for one endpoint, bypassing the
    /// subscription filter. Used by test-sends.
    pub async fn dispatch_to_endpoint(
        &self,
        endpoint: &WebhookEndpoint,
        event: WebhookEventType,
        data: serde_json::Value,
    ) -> Result<WebhookDelivery, StoreError> {
        let payload = serde_json::to_value(WebhookPayload::new(endpoint.owner_id, event, data))?;
        self.create_one(NewDelivery {
            endpoint_id: endpoint.id,
            owner_id: endpoint.owner_id,
            event_name: event.as_str().to_string(),
            payload,
        })
        .await
    }

    /// Creates a fresh pending delivery carrying the same endpoint, event and
    /// payload as `original`. The original row is left untouched.
    pub async fn requeue(&self, original: &WebhookDelivery) -> Result<WebhookDelivery, StoreError> {
        let delivery = self
            .create_one(NewDelivery {
                endpoint_id: original.endpoint_id,
                owner_id: original.owner_id,
                event_name: original.event_name.clone(),
                payload: original.payload.clone(),
            })
            .await?;

        info!(
            delivery_id = %delivery.id,
            original_delivery_id = %original.id,
            endpoint_id = %delivery.endpoint_id,
            "Webhook delivery requeued"
        );
        Ok(delivery)
    }

    async fn create_one(&self, row: NewDelivery) -> Result<WebhookDelivery, StoreError> {
        let delivery = self.deliveries.insert(row).await?;
        record_deliveries_created(&delivery.event_name, 1);
        self.queue.enqueue(delivery.id);
        Ok(delivery)
    }

    fn enqueue_all(&self, deliveries: &[WebhookDelivery]) -> Vec<Uuid> {
        deliveries
            .iter()
            .map(|delivery| {
                self.queue.enqueue(delivery.id);
                delivery.id
            })
            .collect()
    }
}

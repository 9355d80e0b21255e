//! Read-only delivery history for the management API.

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;
use validator::Validate;

use domain::models::{DeliveryStats, ListDeliveriesQuery, WebhookDelivery};
use domain::services::{DeliveryPage, StoreError, WebhookDeliveryStore, WebhookEndpointStore};

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Invalid request")]
    InvalidFields(#[from] validator::ValidationErrors),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct DeliveryAudit {
    endpoints: Arc<dyn WebhookEndpointStore>,
    deliveries: Arc<dyn WebhookDeliveryStore>,
}

impl DeliveryAudit {
    pub fn new(
        endpoints: Arc<dyn WebhookEndpointStore>,
        deliveries: Arc<dyn WebhookDeliveryStore>,
    ) -> Self {
        Self {
            endpoints,
            deliveries,
        }
    }

    /// Deliveries of one endpoint, newest first. Deliveries of a deleted
    /// endpoint stay listable.
    pub async fn list_deliveries(
        &self,
        owner_id: Uuid,
        endpoint_id: Uuid,
        query: &ListDeliveriesQuery,
    ) -> Result<DeliveryPage, AuditError> {
        query.validate()?;

        let page = self
            .deliveries
            .list_by_endpoint(owner_id, endpoint_id, query.status, query.limit(), query.offset())
            .await?;

        if page.total == 0 {
            self.ensure_endpoint(owner_id, endpoint_id).await?;
        }
        Ok(page)
    }

    /// Looks up a delivery by its own owner, so history survives endpoint deletion.
    pub async fn get_delivery(
        &self,
        owner_id: Uuid,
        delivery_id: Uuid,
    ) -> Result<WebhookDelivery, AuditError> {
        self.deliveries
            .find_for_owner(owner_id, delivery_id)
            .await?
            .ok_or(AuditError::NotFound("Delivery"))
    }

    pub async fn stats(
        &self,
        owner_id: Uuid,
        endpoint_id: Uuid,
    ) -> Result<DeliveryStats, AuditError> {
        let stats = self
            .deliveries
            .stats_by_endpoint(owner_id, endpoint_id)
            .await?;

        if stats.total() == 0 {
            self.ensure_endpoint(owner_id, endpoint_id).await?;
        }
        Ok(stats)
    }

    /// 404 for an endpoint id that has no rows of its own.
    async fn ensure_endpoint(&self, owner_id: Uuid, endpoint_id: Uuid) -> Result<(), AuditError> {
        self.endpoints
            .find_for_owner(owner_id, endpoint_id)
            .await?
            .map(|_| ())
            .ok_or(AuditError::NotFound("Webhook"))
    }
}

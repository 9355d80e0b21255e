//! Storage traits for webhook endpoints and deliveries.
//!
//! Every tenant-facing lookup takes the owner id so ownership is enforced at
//! the storage boundary. Unscoped lookups exist only for the delivery worker.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    DeliveryStats, DeliveryStatus, EndpointPatch, NewDelivery, NewWebhookEndpoint,
    WebhookDelivery, WebhookEndpoint, WebhookEventType,
};

/// Errors returned by store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Maps unique-constraint violations to [`StoreError::Conflict`].
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.code().as_deref() == Some("23505") {
                return StoreError::Conflict(db_err.message().to_string());
            }
        }
        StoreError::Database(err)
    }
}

/// Result of a single HTTP attempt, persisted for audit.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptRecord {
    /// Attempt count including this attempt.
    pub attempt_count: i32,
    pub attempted_at: DateTime<Utc>,
    pub response_code: Option<i32>,
    pub error: Option<String>,
}

/// A page of deliveries plus the total number of matching rows.
#[derive(Debug, Clone, Default)]
pub struct DeliveryPage {
    pub deliveries: Vec<WebhookDelivery>,
    pub total: i64,
}

#[async_trait]
pub trait WebhookEndpointStore: Send + Sync {
    async fn insert(&self, endpoint: NewWebhookEndpoint) -> Result<WebhookEndpoint, StoreError>;

    /// Unscoped lookup used by the delivery worker.
    async fn find_by_id(&self, id: Uuid) -> Result<Option<WebhookEndpoint>, StoreError>;

    async fn find_for_owner(
        &self,
        owner_id: Uuid,
        id: Uuid,
    ) -> Result<Option<WebhookEndpoint>, StoreError>;

    async fn find_by_owner_and_name(
        &self,
        owner_id: Uuid,
        name: &str,
    ) -> Result<Option<WebhookEndpoint>, StoreError>;

    /// Newest first.
    async fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<WebhookEndpoint>, StoreError>;

    async fn count_by_owner(&self, owner_id: Uuid) -> Result<i64, StoreError>;

    /// Active endpoints of the owner that subscribe to the event.
    async fn find_active_subscribed(
        &self,
        owner_id: Uuid,
        event: WebhookEventType,
    ) -> Result<Vec<WebhookEndpoint>, StoreError>;

    async fn update(
        &self,
        owner_id: Uuid,
        id: Uuid,
        patch: &EndpointPatch,
    ) -> Result<Option<WebhookEndpoint>, StoreError>;

    /// Replaces the secret in a single update.
    async fn rotate_secret(
        &self,
        owner_id: Uuid,
        id: Uuid,
        secret: &str,
    ) -> Result<Option<WebhookEndpoint>, StoreError>;

    /// Returns true if a row was deleted.
    async fn delete(&self, owner_id: Uuid, id: Uuid) -> Result<bool, StoreError>;

    async fn mark_triggered(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Connectivity check for health endpoints.
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
pub trait WebhookDeliveryStore: Send + Sync {
    /// Inserts pending deliveries. Either all rows are created or none.
    async fn insert_many(
        &self,
        deliveries: Vec<NewDelivery>,
    ) -> Result<Vec<WebhookDelivery>, StoreError>;

    async fn insert(&self, delivery: NewDelivery) -> Result<WebhookDelivery, StoreError> {
        self.insert_many(vec![delivery])
            .await?
            .pop()
            .ok_or_else(|| StoreError::Corrupt("Insert returned no row".to_string()))
    }

    /// Unscoped lookup used by the delivery worker.
    async fn find_by_id(&self, id: Uuid) -> Result<Option<WebhookDelivery>, StoreError>;

    async fn find_for_owner(
        &self,
        owner_id: Uuid,
        id: Uuid,
    ) -> Result<Option<WebhookDelivery>, StoreError>;

    /// Newest first.
    async fn list_by_endpoint(
        &self,
        owner_id: Uuid,
        endpoint_id: Uuid,
        status: Option<DeliveryStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<DeliveryPage, StoreError>;

    async fn stats_by_endpoint(
        &self,
        owner_id: Uuid,
        endpoint_id: Uuid,
    ) -> Result<DeliveryStats, StoreError>;

    /// Takes a lease on a pending, due, unclaimed delivery.
    ///
    /// Returns false when the row is terminal, not yet due, or leased by
    /// someone else.
    async fn claim(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Sets `delivered_at`, clears `next_retry_at` and the lease.
    async fn mark_delivered(&self, id: Uuid, attempt: &AttemptRecord) -> Result<(), StoreError>;

    /// Records a failed attempt and the time of the next one.
    async fn schedule_retry(
        &self,
        id: Uuid,
        attempt: &AttemptRecord,
        next_retry_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Sets `failed_at`, clears `next_retry_at` and the lease. `attempt` is
    /// `None` when no HTTP call was made.
    async fn mark_failed(
        &self,
        id: Uuid,
        attempt: Option<&AttemptRecord>,
        failed_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Moves an unleased pending delivery's `next_retry_at` to `until` without
    /// recording an attempt.
    async fn postpone(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Pending, unleased deliveries whose retry time has passed, oldest first.
    async fn find_due(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Uuid>, StoreError>;

    /// Marks pending, unleased deliveries created before `created_before` as
    /// failed and returns their ids.
    async fn fail_expired(
        &self,
        created_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, StoreError>;
}

//! In-memory stores for tests and lightweight deployments.
//!
//! Semantics match the Postgres repositories, including the guards that keep
//! terminal deliveries immutable.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use domain::models::{
    DeliveryStats, DeliveryStatus, EndpointPatch, NewDelivery, NewWebhookEndpoint,
    WebhookDelivery, WebhookEndpoint, WebhookEventType,
};
use domain::services::{
    AttemptRecord, DeliveryPage, StoreError, WebhookDeliveryStore, WebhookEndpointStore,
};

/// In-memory webhook endpoint store.
#[derive(Debug, Default)]
pub struct InMemoryEndpointStore {
    endpoints: RwLock<HashMap<Uuid, WebhookEndpoint>>,
}

impl InMemoryEndpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn name_taken(
        endpoints: &HashMap<Uuid, WebhookEndpoint>,
        owner_id: Uuid,
        name: &str,
        except: Option<Uuid>,
    ) -> bool {
        endpoints
            .values()
            .any(|e| e.owner_id == owner_id && e.name == name && Some(e.id) != except)
    }
}

#[async_trait]
impl WebhookEndpointStore for InMemoryEndpointStore {
    async fn insert(&self, endpoint: NewWebhookEndpoint) -> Result<WebhookEndpoint, StoreError> {
        let mut endpoints = self.endpoints.write().await;
        if Self::name_taken(&endpoints, endpoint.owner_id, &endpoint.name, None) {
            return Err(StoreError::Conflict(
                "webhook_endpoints_owner_name_unique".to_string(),
            ));
        }

        let now = Utc::now();
        let created = WebhookEndpoint {
            id: Uuid::new_v4(),
            owner_id: endpoint.owner_id,
            name: endpoint.name,
            url: endpoint.url,
            secret: endpoint.secret,
            subscribed_events: endpoint.subscribed_events,
            is_active: endpoint.is_active,
            last_triggered_at: None,
            created_at: now,
            updated_at: now,
        };
        endpoints.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<WebhookEndpoint>, StoreError> {
        Ok(self.endpoints.read().await.get(&id).cloned())
    }

    async fn find_for_owner(
        &self,
        owner_id: Uuid,
        id: Uuid,
    ) -> Result<Option<WebhookEndpoint>, StoreError> {
        Ok(self
            .endpoints
            .read()
            .await
            .get(&id)
            .filter(|e| e.owner_id == owner_id)
            .cloned())
    }

    async fn find_by_owner_and_name(
        &self,
        owner_id: Uuid,
        name: &str,
    ) -> Result<Option<WebhookEndpoint>, StoreError> {
        Ok(self
            .endpoints
            .read()
            .await
            .values()
            .find(|e| e.owner_id == owner_id && e.name == name)
            .cloned())
    }

    async fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<WebhookEndpoint>, StoreError> {
        let mut endpoints: Vec<_> = self
            .endpoints
            .read()
            .await
            .values()
            .filter(|e| e.owner_id == owner_id)
            .cloned()
            .collect();
        endpoints.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(endpoints)
    }

    async fn count_by_owner(&self, owner_id: Uuid) -> Result<i64, StoreError> {
        Ok(self
            .endpoints
            .read()
            .await
            .values()
            .filter(|e| e.owner_id == owner_id)
            .count() as i64)
    }

    async fn find_active_subscribed(
        &self,
        owner_id: Uuid,
        event: WebhookEventType,
    ) -> Result<Vec<WebhookEndpoint>, StoreError> {
        let mut endpoints: Vec<_> = self
            .endpoints
            .read()
            .await
            .values()
            .filter(|e| e.owner_id == owner_id && e.accepts(event))
            .cloned()
            .collect();
        endpoints.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(endpoints)
    }

    async fn update(
        &self,
        owner_id: Uuid,
        id: Uuid,
        patch: &EndpointPatch,
    ) -> Result<Option<WebhookEndpoint>, StoreError> {
        let mut endpoints = self.endpoints.write().await;
        if let Some(name) = &patch.name {
            if Self::name_taken(&endpoints, owner_id, name, Some(id)) {
                return Err(StoreError::Conflict(
                    "webhook_endpoints_owner_name_unique".to_string(),
                ));
            }
        }

        let Some(endpoint) = endpoints.get_mut(&id).filter(|e| e.owner_id == owner_id) else {
            return Ok(None);
        };

        if let Some(name) = &patch.name {
            endpoint.name = name.clone();
        }
        if let Some(url) = &patch.url {
            endpoint.url = url.clone();
        }
        if let Some(events) = &patch.subscribed_events {
            endpoint.subscribed_events = events.clone();
        }
        if let Some(is_active) = patch.is_active {
            endpoint.is_active = is_active;
        }
        endpoint.updated_at = Utc::now();
        Ok(Some(endpoint.clone()))
    }

    async fn rotate_secret(
        &self,
        owner_id: Uuid,
        id: Uuid,
        secret: &str,
    ) -> Result<Option<WebhookEndpoint>, StoreError> {
        let mut endpoints = self.endpoints.write().await;
        Ok(endpoints
            .get_mut(&id)
            .filter(|e| e.owner_id == owner_id)
            .map(|endpoint| {
                endpoint.secret = secret.to_string();
                endpoint.updated_at = Utc::now();
                endpoint.clone()
            }))
    }

    async fn delete(&self, owner_id: Uuid, id: Uuid) -> Result<bool, StoreError> {
        let mut endpoints = self.endpoints.write().await;
        if endpoints.get(&id).map(|e| e.owner_id) == Some(owner_id) {
            endpoints.remove(&id);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn mark_triggered(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        if let Some(endpoint) = self.endpoints.write().await.get_mut(&id) {
            endpoint.last_triggered_at = Some(at);
        }
        Ok(())
    }
}

/// In-memory webhook delivery store.
#[derive(Debug, Default)]
pub struct InMemoryDeliveryStore {
    deliveries: RwLock<HashMap<Uuid, WebhookDelivery>>,
}

impl InMemoryDeliveryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a delivery as-is, replacing any row with the same id.
    pub async fn put(&self, delivery: WebhookDelivery) {
        self.deliveries.write().await.insert(delivery.id, delivery);
    }

    /// All stored deliveries, oldest first.
    pub async fn all(&self) -> Vec<WebhookDelivery> {
        let mut deliveries: Vec<_> = self.deliveries.read().await.values().cloned().collect();
        deliveries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        deliveries
    }

    /// Applies `f` to a pending delivery; terminal rows are left untouched.
    async fn update_pending<F>(&self, id: Uuid, f: F)
    where
        F: FnOnce(&mut WebhookDelivery),
    {
        if let Some(delivery) = self
            .deliveries
            .write()
            .await
            .get_mut(&id)
            .filter(|d| d.status() == DeliveryStatus::Pending)
        {
            f(delivery);
        }
    }

    fn is_free(delivery: &WebhookDelivery, now: DateTime<Utc>) -> bool {
        delivery.status() == DeliveryStatus::Pending && !delivery.is_claimed(now)
    }
}

#[async_trait]
impl WebhookDeliveryStore for InMemoryDeliveryStore {
    async fn insert_many(
        &self,
        deliveries: Vec<NewDelivery>,
    ) -> Result<Vec<WebhookDelivery>, StoreError> {
        let mut store = self.deliveries.write().await;
        let now = Utc::now();

        Ok(deliveries
            .into_iter()
            .map(|new| {
                let delivery = WebhookDelivery {
                    id: Uuid::new_v4(),
                    endpoint_id: new.endpoint_id,
                    owner_id: new.owner_id,
                    event_name: new.event_name,
                    payload: new.payload,
                    attempt_count: 0,
                    created_at: now,
                    delivered_at: None,
                    failed_at: None,
                    next_retry_at: None,
                    last_attempt_at: None,
                    last_response_code: None,
                    last_error: None,
                    claimed_until: None,
                };
                store.insert(delivery.id, delivery.clone());
                delivery
            })
            .collect())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<WebhookDelivery>, StoreError> {
        Ok(self.deliveries.read().await.get(&id).cloned())
    }

    async fn find_for_owner(
        &self,
        owner_id: Uuid,
        id: Uuid,
    ) -> Result<Option<WebhookDelivery>, StoreError> {
        Ok(self
            .deliveries
            .read()
            .await
            .get(&id)
            .filter(|d| d.owner_id == owner_id)
            .cloned())
    }

    async fn list_by_endpoint(
        &self,
        owner_id: Uuid,
        endpoint_id: Uuid,
        status: Option<DeliveryStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<DeliveryPage, StoreError> {
        let mut matching: Vec<_> = self
            .deliveries
            .read()
            .await
            .values()
            .filter(|d| d.owner_id == owner_id && d.endpoint_id == endpoint_id)
            .filter(|d| status.map(|s| d.status() == s).unwrap_or(true))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len() as i64;
        let deliveries = matching
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();

        Ok(DeliveryPage { deliveries, total })
    }

    async fn stats_by_endpoint(
        &self,
        owner_id: Uuid,
        endpoint_id: Uuid,
    ) -> Result<DeliveryStats, StoreError> {
        let mut stats = DeliveryStats::default();
        for delivery in self
            .deliveries
            .read()
            .await
            .values()
            .filter(|d| d.owner_id == owner_id && d.endpoint_id == endpoint_id)
        {
            match delivery.status() {
                DeliveryStatus::Pending => stats.pending += 1,
                DeliveryStatus::Delivered => stats.delivered += 1,
                DeliveryStatus::Failed => stats.failed += 1,
            }
        }
        Ok(stats)
    }

    async fn claim(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut deliveries = self.deliveries.write().await;
        match deliveries.get_mut(&id) {
            Some(delivery) if Self::is_free(delivery, now) && !delivery.is_waiting_for_retry(now) => {
                delivery.claimed_until = Some(lease_until);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_delivered(&self, id: Uuid, attempt: &AttemptRecord) -> Result<(), StoreError> {
        self.update_pending(id, |d| {
            d.delivered_at = Some(attempt.attempted_at);
            d.attempt_count = attempt.attempt_count;
            d.last_attempt_at = Some(attempt.attempted_at);
            d.last_response_code = attempt.response_code;
            d.last_error = None;
            d.next_retry_at = None;
            d.claimed_until = None;
        })
        .await;
        Ok(())
    }

    async fn schedule_retry(
        &self,
        id: Uuid,
        attempt: &AttemptRecord,
        next_retry_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.update_pending(id, |d| {
            d.attempt_count = attempt.attempt_count;
            d.last_attempt_at = Some(attempt.attempted_at);
            d.last_response_code = attempt.response_code;
            d.last_error = attempt.error.clone();
            d.next_retry_at = Some(next_retry_at);
            d.claimed_until = None;
        })
        .await;
        Ok(())
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        attempt: Option<&AttemptRecord>,
        failed_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.update_pending(id, |d| {
            d.failed_at = Some(failed_at);
            if let Some(attempt) = attempt {
                d.attempt_count = attempt.attempt_count;
                d.last_attempt_at = Some(attempt.attempted_at);
                d.last_response_code = attempt.response_code;
                d.last_error = attempt.error.clone();
            }
            d.next_retry_at = None;
            d.claimed_until = None;
        })
        .await;
        Ok(())
    }

    async fn postpone(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if let Some(delivery) = self
            .deliveries
            .write()
            .await
            .get_mut(&id)
            .filter(|d| Self::is_free(d, now))
        {
            delivery.next_retry_at = Some(until);
        }
        Ok(())
    }

    async fn find_due(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Uuid>, StoreError> {
        let mut due: Vec<_> = self
            .deliveries
            .read()
            .await
            .values()
            .filter(|d| Self::is_free(d, now) && !d.is_waiting_for_retry(now))
            .map(|d| (d.next_retry_at.unwrap_or(d.created_at), d.id))
            .collect();
        due.sort();
        Ok(due
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|(_, id)| id)
            .collect())
    }

    async fn fail_expired(
        &self,
        created_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, StoreError> {
        let mut failed = Vec::new();
        for delivery in self.deliveries.write().await.values_mut() {
            if Self::is_free(delivery, now) && delivery.created_at < created_before {
                delivery.failed_at = Some(now);
                delivery.next_retry_at = None;
                delivery.claimed_until = None;
                failed.push(delivery.id);
            }
        }
        Ok(failed)
    }
}

//! Webhook endpoint repository for database operations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use domain::models::{EndpointPatch, NewWebhookEndpoint, WebhookEndpoint, WebhookEventType};
use domain::services::{StoreError, WebhookEndpointStore};

use crate::entities::webhook_endpoint::{event_names, WebhookEndpointEntity};
use crate::metrics::QueryTimer;

const ENDPOINT_COLUMNS: &str = "id, owner_id, name, url, secret, subscribed_events, is_active, \
                                last_triggered_at, created_at, updated_at";

/// Repository for webhook endpoint rows.
#[derive(Clone)]
pub struct WebhookEndpointRepository {
    pool: PgPool,
}

impl WebhookEndpointRepository {
    /// Creates a new WebhookEndpointRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn to_domain(entity: Option<WebhookEndpointEntity>) -> Result<Option<WebhookEndpoint>, StoreError> {
        entity.map(WebhookEndpoint::try_from).transpose()
    }

    fn to_domain_vec(entities: Vec<WebhookEndpointEntity>) -> Result<Vec<WebhookEndpoint>, StoreError> {
        entities.into_iter().map(WebhookEndpoint::try_from).collect()
    }
}

#[async_trait]
impl WebhookEndpointStore for WebhookEndpointRepository {
    async fn insert(&self, endpoint: NewWebhookEndpoint) -> Result<WebhookEndpoint, StoreError> {
        let timer = QueryTimer::new("create_webhook_endpoint");
        let result = sqlx::query_as::<_, WebhookEndpointEntity>(&format!(
            r#"
            INSERT INTO webhook_endpoints (owner_id, name, url, secret, subscribed_events, is_active)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {ENDPOINT_COLUMNS}
            "#
        ))
        .bind(endpoint.owner_id)
        .bind(&endpoint.name)
        .bind(&endpoint.url)
        .bind(&endpoint.secret)
        .bind(event_names(&endpoint.subscribed_events))
        .bind(endpoint.is_active)
        .fetch_one(&self.pool)
        .await;
        timer.record();

        result.map_err(StoreError::from_sqlx)?.try_into()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<WebhookEndpoint>, StoreError> {
        let timer = QueryTimer::new("find_webhook_endpoint_by_id");
        let result = sqlx::query_as::<_, WebhookEndpointEntity>(&format!(
            "SELECT {ENDPOINT_COLUMNS} FROM webhook_endpoints WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();

        Self::to_domain(result?)
    }

    async fn find_for_owner(
        &self,
        owner_id: Uuid,
        id: Uuid,
    ) -> Result<Option<WebhookEndpoint>, StoreError> {
        let timer = QueryTimer::new("find_webhook_endpoint_for_owner");
        let result = sqlx::query_as::<_, WebhookEndpointEntity>(&format!(
            "SELECT {ENDPOINT_COLUMNS} FROM webhook_endpoints WHERE id = $1 AND owner_id = $2"
        ))
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();

        Self::to_domain(result?)
    }

    async fn find_by_owner_and_name(
        &self,
        owner_id: Uuid,
        name: &str,
    ) -> Result<Option<WebhookEndpoint>, StoreError> {
        let timer = QueryTimer::new("find_webhook_endpoint_by_owner_and_name");
        let result = sqlx::query_as::<_, WebhookEndpointEntity>(&format!(
            "SELECT {ENDPOINT_COLUMNS} FROM webhook_endpoints WHERE owner_id = $1 AND name = $2"
        ))
        .bind(owner_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await;
        timer.record();

        Self::to_domain(result?)
    }

    async fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<WebhookEndpoint>, StoreError> {
        let timer = QueryTimer::new("list_webhook_endpoints_by_owner");
        let result = sqlx::query_as::<_, WebhookEndpointEntity>(&format!(
            r#"
            SELECT {ENDPOINT_COLUMNS} FROM webhook_endpoints
            WHERE owner_id = $1
            ORDER BY created_at DESC
            "#
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await;
        timer.record();

        Self::to_domain_vec(result?)
    }

    async fn count_by_owner(&self, owner_id: Uuid) -> Result<i64, StoreError> {
        let timer = QueryTimer::new("count_webhook_endpoints_by_owner");
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM webhook_endpoints WHERE owner_id = $1")
                .bind(owner_id)
                .fetch_one(&self.pool)
                .await?;
        timer.record();
        Ok(count.0)
    }

    async fn find_active_subscribed(
        &self,
        owner_id: Uuid,
        event: WebhookEventType,
    ) -> Result<Vec<WebhookEndpoint>, StoreError> {
        let timer = QueryTimer::new("find_active_subscribed_webhook_endpoints");
        let result = sqlx::query_as::<_, WebhookEndpointEntity>(&format!(
            r#"
            SELECT {ENDPOINT_COLUMNS} FROM webhook_endpoints
            WHERE owner_id = $1
              AND is_active
              AND $2 = ANY(subscribed_events)
            ORDER BY created_at ASC
            "#
        ))
        .bind(owner_id)
        .bind(event.as_str())
        .fetch_all(&self.pool)
        .await;
        timer.record();

        Self::to_domain_vec(result?)
    }

    async fn update(
        &self,
        owner_id: Uuid,
        id: Uuid,
        patch: &EndpointPatch,
    ) -> Result<Option<WebhookEndpoint>, StoreError> {
        let timer = QueryTimer::new("update_webhook_endpoint");
        let result = sqlx::query_as::<_, WebhookEndpointEntity>(&format!(
            r#"
            UPDATE webhook_endpoints SET
                name = COALESCE($3, name),
                url = COALESCE($4, url),
                subscribed_events = COALESCE($5, subscribed_events),
                is_active = COALESCE($6, is_active),
                updated_at = NOW()
            WHERE id = $1 AND owner_id = $2
            RETURNING {ENDPOINT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(owner_id)
        .bind(patch.name.as_deref())
        .bind(patch.url.as_deref())
        .bind(patch.subscribed_events.as_deref().map(event_names))
        .bind(patch.is_active)
        .fetch_optional(&self.pool)
        .await;
        timer.record();

        Self::to_domain(result.map_err(StoreError::from_sqlx)?)
    }

    async fn rotate_secret(
        &self,
        owner_id: Uuid,
        id: Uuid,
        secret: &str,
    ) -> Result<Option<WebhookEndpoint>, StoreError> {
        let timer = QueryTimer::new("rotate_webhook_endpoint_secret");
        let result = sqlx::query_as::<_, WebhookEndpointEntity>(&format!(
            r#"
            UPDATE webhook_endpoints SET secret = $3, updated_at = NOW()
            WHERE id = $1 AND owner_id = $2
            RETURNING {ENDPOINT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(owner_id)
        .bind(secret)
        .fetch_optional(&self.pool)
        .await;
        timer.record();

        Self::to_domain(result?)
    }

    async fn delete(&self, owner_id: Uuid, id: Uuid) -> Result<bool, StoreError> {
        let timer = QueryTimer::new("delete_webhook_endpoint");
        let result = sqlx::query("DELETE FROM webhook_endpoints WHERE id = $1 AND owner_id = $2")
            .bind(id)
            .bind(owner_id)
            .execute(&self.pool)
            .await;
        timer.record();

        Ok(result?.rows_affected() > 0)
    }

    async fn mark_triggered(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        let timer = QueryTimer::new("mark_webhook_endpoint_triggered");
        let result = sqlx::query("UPDATE webhook_endpoints SET last_triggered_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await;
        timer.record();

        result?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

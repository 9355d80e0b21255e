//! Webhook delivery repository.
//!
//! Every state change is a single-row update keyed by delivery id, guarded so
//! that a terminal row is never modified again.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use domain::models::{DeliveryStats, DeliveryStatus, NewDelivery, WebhookDelivery};
use domain::services::{AttemptRecord, DeliveryPage, StoreError, WebhookDeliveryStore};

use crate::entities::WebhookDeliveryEntity;
use crate::metrics::QueryTimer;

const DELIVERY_COLUMNS: &str = "id, endpoint_id, owner_id, event_name, payload, attempt_count, \
                                created_at, delivered_at, failed_at, next_retry_at, \
                                last_attempt_at, last_response_code, last_error, claimed_until";

const PENDING: &str = "delivered_at IS NULL AND failed_at IS NULL";

/// SQL predicate for a status filter.
fn status_predicate(status: DeliveryStatus) -> &'static str {
    match status {
        DeliveryStatus::Pending => "delivered_at IS NULL AND failed_at IS NULL",
        DeliveryStatus::Delivered => "delivered_at IS NOT NULL",
        DeliveryStatus::Failed => "failed_at IS NOT NULL",
    }
}

/// Logs a guarded update that matched no pending row.
fn note_ignored_update(operation: &'static str, id: Uuid, rows_affected: u64) {
    if rows_affected == 0 {
        tracing::debug!(
            delivery_id = %id,
            operation,
            "Webhook delivery no longer pending, update ignored"
        );
    }
}

/// Repository for webhook delivery operations.
#[derive(Clone)]
pub struct WebhookDeliveryRepository {
    pool: PgPool,
}

impl WebhookDeliveryRepository {
    /// Create a new repository instance.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WebhookDeliveryStore for WebhookDeliveryRepository {
    async fn insert_many(
        &self,
        deliveries: Vec<NewDelivery>,
    ) -> Result<Vec<WebhookDelivery>, StoreError> {
        if deliveries.is_empty() {
            return Ok(Vec::new());
        }

        let timer = QueryTimer::new("create_webhook_deliveries");
        let mut tx = self.pool.begin().await?;
        let mut created = Vec::with_capacity(deliveries.len());

        for delivery in deliveries {
            let entity = sqlx::query_as::<_, WebhookDeliveryEntity>(&format!(
                r#"
                INSERT INTO webhook_deliveries (endpoint_id, owner_id, event_name, payload, attempt_count)
                VALUES ($1, $2, $3, $4, 0)
                RETURNING {DELIVERY_COLUMNS}
                "#
            ))
            .bind(delivery.endpoint_id)
            .bind(delivery.owner_id)
            .bind(&delivery.event_name)
            .bind(&delivery.payload)
            .fetch_one(&mut *tx)
            .await?;
            created.push(entity.into());
        }

        tx.commit().await?;
        timer.record();
        Ok(created)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<WebhookDelivery>, StoreError> {
        let timer = QueryTimer::new("find_webhook_delivery_by_id");
        let result = sqlx::query_as::<_, WebhookDeliveryEntity>(&format!(
            "SELECT {DELIVERY_COLUMNS} FROM webhook_deliveries WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();

        Ok(result?.map(Into::into))
    }

    async fn find_for_owner(
        &self,
        owner_id: Uuid,
        id: Uuid,
    ) -> Result<Option<WebhookDelivery>, StoreError> {
        let timer = QueryTimer::new("find_webhook_delivery_for_owner");
        let result = sqlx::query_as::<_, WebhookDeliveryEntity>(&format!(
            "SELECT {DELIVERY_COLUMNS} FROM webhook_deliveries WHERE id = $1 AND owner_id = $2"
        ))
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();

        Ok(result?.map(Into::into))
    }

    async fn list_by_endpoint(
        &self,
        owner_id: Uuid,
        endpoint_id: Uuid,
        status: Option<DeliveryStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<DeliveryPage, StoreError> {
        let filter = status
            .map(|s| format!("AND {}", status_predicate(s)))
            .unwrap_or_default();

        let timer = QueryTimer::new("list_webhook_deliveries_by_endpoint");
        let entities = sqlx::query_as::<_, WebhookDeliveryEntity>(&format!(
            r#"
            SELECT {DELIVERY_COLUMNS} FROM webhook_deliveries
            WHERE owner_id = $1 AND endpoint_id = $2 {filter}
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(owner_id)
        .bind(endpoint_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: (i64,) = sqlx::query_as(&format!(
            "SELECT COUNT(*) FROM webhook_deliveries WHERE owner_id = $1 AND endpoint_id = $2 {filter}"
        ))
        .bind(owner_id)
        .bind(endpoint_id)
        .fetch_one(&self.pool)
        .await?;
        timer.record();

        Ok(DeliveryPage {
            deliveries: entities.into_iter().map(Into::into).collect(),
            total: total.0,
        })
    }

    async fn stats_by_endpoint(
        &self,
        owner_id: Uuid,
        endpoint_id: Uuid,
    ) -> Result<DeliveryStats, StoreError> {
        let timer = QueryTimer::new("webhook_delivery_stats_by_endpoint");
        let row: (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE delivered_at IS NULL AND failed_at IS NULL),
                COUNT(*) FILTER (WHERE delivered_at IS NOT NULL),
                COUNT(*) FILTER (WHERE failed_at IS NOT NULL)
            FROM webhook_deliveries
            WHERE owner_id = $1 AND endpoint_id = $2
            "#,
        )
        .bind(owner_id)
        .bind(endpoint_id)
        .fetch_one(&self.pool)
        .await?;
        timer.record();

        Ok(DeliveryStats {
            pending: row.0,
            delivered: row.1,
            failed: row.2,
        })
    }

    async fn claim(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let timer = QueryTimer::new("claim_webhook_delivery");
        let result = sqlx::query(&format!(
            r#"
            UPDATE webhook_deliveries SET claimed_until = $3
            WHERE id = $1
              AND {PENDING}
              AND (claimed_until IS NULL OR claimed_until <= $2)
              AND (next_retry_at IS NULL OR next_retry_at <= $2)
            "#
        ))
        .bind(id)
        .bind(now)
        .bind(lease_until)
        .execute(&self.pool)
        .await;
        timer.record();

        Ok(result?.rows_affected() == 1)
    }

    async fn mark_delivered(&self, id: Uuid, attempt: &AttemptRecord) -> Result<(), StoreError> {
        let timer = QueryTimer::new("mark_webhook_delivery_delivered");
        let result = sqlx::query(&format!(
            r#"
            UPDATE webhook_deliveries SET
                delivered_at = $3,
                attempt_count = $2,
                last_attempt_at = $3,
                last_response_code = $4,
                last_error = NULL,
                next_retry_at = NULL,
                claimed_until = NULL
            WHERE id = $1 AND {PENDING}
            "#
        ))
        .bind(id)
        .bind(attempt.attempt_count)
        .bind(attempt.attempted_at)
        .bind(attempt.response_code)
        .execute(&self.pool)
        .await;
        timer.record();

        note_ignored_update("mark_delivered", id, result?.rows_affected());
        Ok(())
    }

    async fn schedule_retry(
        &self,
        id: Uuid,
        attempt: &AttemptRecord,
        next_retry_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let timer = QueryTimer::new("schedule_webhook_delivery_retry");
        let result = sqlx::query(&format!(
            r#"
            UPDATE webhook_deliveries SET
                attempt_count = $2,
                last_attempt_at = $3,
                last_response_code = $4,
                last_error = $5,
                next_retry_at = $6,
                claimed_until = NULL
            WHERE id = $1 AND {PENDING}
            "#
        ))
        .bind(id)
        .bind(attempt.attempt_count)
        .bind(attempt.attempted_at)
        .bind(attempt.response_code)
        .bind(attempt.error.as_deref())
        .bind(next_retry_at)
        .execute(&self.pool)
        .await;
        timer.record();

        note_ignored_update("schedule_retry", id, result?.rows_affected());
        Ok(())
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        attempt: Option<&AttemptRecord>,
        failed_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let timer = QueryTimer::new("mark_webhook_delivery_failed");
        let result = sqlx::query(&format!(
            r#"
            UPDATE webhook_deliveries SET
                failed_at = $2,
                attempt_count = COALESCE($3, attempt_count),
                last_attempt_at = COALESCE($4, last_attempt_at),
                last_response_code = CASE WHEN $3 IS NULL THEN last_response_code ELSE $5 END,
                last_error = CASE WHEN $3 IS NULL THEN last_error ELSE $6 END,
                next_retry_at = NULL,
                claimed_until = NULL
            WHERE id = $1 AND {PENDING}
            "#
        ))
        .bind(id)
        .bind(failed_at)
        .bind(attempt.map(|a| a.attempt_count))
        .bind(attempt.map(|a| a.attempted_at))
        .bind(attempt.and_then(|a| a.response_code))
        .bind(attempt.and_then(|a| a.error.as_deref()))
        .execute(&self.pool)
        .await;
        timer.record();

        note_ignored_update("mark_failed", id, result?.rows_affected());
        Ok(())
    }

    async fn postpone(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let timer = QueryTimer::new("postpone_webhook_delivery");
        let result = sqlx::query(&format!(
            r#"
            UPDATE webhook_deliveries SET next_retry_at = $3
            WHERE id = $1
              AND {PENDING}
              AND (claimed_until IS NULL OR claimed_until <= $2)
            "#
        ))
        .bind(id)
        .bind(now)
        .bind(until)
        .execute(&self.pool)
        .await;
        timer.record();

        note_ignored_update("postpone", id, result?.rows_affected());
        Ok(())
    }

    async fn find_due(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Uuid>, StoreError> {
        let timer = QueryTimer::new("find_due_webhook_deliveries");
        let rows: Vec<(Uuid,)> = sqlx::query_as(&format!(
            r#"
            SELECT id FROM webhook_deliveries
            WHERE {PENDING}
              AND (next_retry_at IS NULL OR next_retry_at <= $1)
              AND (claimed_until IS NULL OR claimed_until <= $1)
            ORDER BY COALESCE(next_retry_at, created_at) ASC
            LIMIT $2
            "#
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        timer.record();

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn fail_expired(
        &self,
        created_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, StoreError> {
        let timer = QueryTimer::new("fail_expired_webhook_deliveries");
        let rows: Vec<(Uuid,)> = sqlx::query_as(&format!(
            r#"
            UPDATE webhook_deliveries SET
                failed_at = $2,
                next_retry_at = NULL,
                claimed_until = NULL
            WHERE {PENDING}
              AND created_at < $1
              AND (claimed_until IS NULL OR claimed_until <= $2)
            RETURNING id
            "#
        ))
        .bind(created_before)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        timer.record();

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

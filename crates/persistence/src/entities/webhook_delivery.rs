//! Webhook delivery entity definitions.
//!
//! Maps to the webhook_deliveries table. Status is not stored; it follows from
//! `delivered_at` and `failed_at`.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use domain::models::WebhookDelivery;

/// Database entity for webhook_deliveries table.
#[derive(Debug, Clone, FromRow)]
pub struct WebhookDeliveryEntity {
    pub id: Uuid,
    pub endpoint_id: Uuid,
    pub owner_id: Uuid,
    pub event_name: String,
    pub payload: serde_json::Value,
    pub attempt_count: i32,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_response_code: Option<i32>,
    pub last_error: Option<String>,
    pub claimed_until: Option<DateTime<Utc>>,
}

impl From<WebhookDeliveryEntity> for WebhookDelivery {
    fn from(entity: WebhookDeliveryEntity) -> Self {
        Self {
            id: entity.id,
            endpoint_id: entity.endpoint_id,
            owner_id: entity.owner_id,
            event_name: entity.event_name,
            payload: entity.payload,
            attempt_count: entity.attempt_count,
            created_at: entity.created_at,
            delivered_at: entity.delivered_at,
            failed_at: entity.failed_at,
            next_retry_at: entity.next_retry_at,
            last_attempt_at: entity.last_attempt_at,
            last_response_code: entity.last_response_code,
            last_error: entity.last_error,
            claimed_until: entity.claimed_until,
        }
    }
}

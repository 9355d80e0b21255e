//! Webhook endpoint entity (database row mapping).

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use domain::models::{WebhookEndpoint, WebhookEventType};
use domain::services::StoreError;

/// Database row mapping for the webhook_endpoints table.
#[derive(Debug, Clone, FromRow)]
pub struct WebhookEndpointEntity {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub url: String,
    pub secret: String,
    pub subscribed_events: Vec<String>,
    pub is_active: bool,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Converts typed events to the TEXT[] column representation.
pub fn event_names(events: &[WebhookEventType]) -> Vec<String> {
    events.iter().map(|e| e.as_str().to_string()).collect()
}

impl TryFrom<WebhookEndpointEntity> for WebhookEndpoint {
    type Error = StoreError;

    fn try_from(entity: WebhookEndpointEntity) -> Result<Self, Self::Error> {
        let subscribed_events = entity
            .subscribed_events
            .iter()
            .map(|name| {
                name.parse::<WebhookEventType>().map_err(|e| {
                    tracing::error!(
                        endpoint_id = %entity.id,
                        event = %name,
                        "Unknown event in stored webhook endpoint"
                    );
                    StoreError::Corrupt(format!("webhook endpoint {}: {}", entity.id, e))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            id: entity.id,
            owner_id: entity.owner_id,
            name: entity.name,
            url: entity.url,
            secret: entity.secret,
            subscribed_events,
            is_active: entity.is_active,
            last_triggered_at: entity.last_triggered_at,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        })
    }
}

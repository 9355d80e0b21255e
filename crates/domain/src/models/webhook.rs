//! Webhook endpoint domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::validation::{validate_https_url, validate_not_blank};
use uuid::Uuid;
use validator::Validate;

use super::webhook_event::{ParseEventTypeError, WebhookEventType};

/// A user-registered destination for webhook deliveries.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEndpoint {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub url: String,
    pub secret: String,
    pub subscribed_events: Vec<WebhookEventType>,
    pub is_active: bool,
    /// Set only by the delivery worker after a successful delivery.
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WebhookEndpoint {
    /// Check whether this endpoint subscribes to the given event.
    pub fn subscribes_to(&self, event: WebhookEventType) -> bool {
        self.subscribed_events.contains(&event)
    }

    /// Check whether fan-out should create a delivery for the given event.
    pub fn accepts(&self, event: WebhookEventType) -> bool {
        self.is_active && self.subscribes_to(event)
    }
}

/// Values needed to insert a new endpoint.
#[derive(Debug, Clone)]
pub struct NewWebhookEndpoint {
    pub owner_id: Uuid,
    pub name: String,
    pub url: String,
    pub secret: String,
    pub subscribed_events: Vec<WebhookEventType>,
    pub is_active: bool,
}

/// Partial update applied by the registry. `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EndpointPatch {
    pub name: Option<String>,
    pub url: Option<String>,
    pub subscribed_events: Option<Vec<WebhookEventType>>,
    pub is_active: Option<bool>,
}

fn default_active() -> bool {
    true
}

/// Parses and deduplicates event names supplied by a client.
///
/// Rejects empty sets, unknown names and the reserved test event.
pub fn parse_subscribed_events(names: &[String]) -> Result<Vec<WebhookEventType>, String> {
    if names.is_empty() {
        return Err("At least one event type is required".to_string());
    }

    let mut events = names
        .iter()
        .map(|name| {
            let event: WebhookEventType = name.parse().map_err(|e: ParseEventTypeError| e.to_string())?;
            if event.is_subscribable() {
                Ok(event)
            } else {
                Err(format!("Event type {} cannot be subscribed to", event))
            }
        })
        .collect::<Result<Vec<_>, String>>()?;

    events.sort();
    events.dedup();
    Ok(events)
}

/// Request payload for creating a webhook endpoint.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateWebhookEndpointRequest {
    #[validate(
        length(min = 1, max = 100, message = "Name must be 1-100 characters"),
        custom(function = "validate_not_blank")
    )]
    pub name: String,

    #[validate(
        url(message = "Invalid URL format"),
        length(max = 2048, message = "URL must be at most 2048 characters"),
        custom(function = "validate_https_url")
    )]
    pub url: String,

    #[validate(length(min = 1, message = "At least one event type is required"))]
    pub events: Vec<String>,

    #[serde(default = "default_active")]
    pub is_active: bool,
}

impl CreateWebhookEndpointRequest {
    /// Validates the event names and returns them as typed events.
    pub fn subscribed_events(&self) -> Result<Vec<WebhookEventType>, String> {
        parse_subscribed_events(&self.events)
    }
}

/// Request payload for updating a webhook endpoint (partial update).
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateWebhookEndpointRequest {
    #[validate(
        length(min = 1, max = 100, message = "Name must be 1-100 characters"),
        custom(function = "validate_not_blank")
    )]
    pub name: Option<String>,

    #[validate(
        url(message = "Invalid URL format"),
        length(max = 2048, message = "URL must be at most 2048 characters"),
        custom(function = "validate_https_url")
    )]
    pub url: Option<String>,

    pub events: Option<Vec<String>>,

    pub is_active: Option<bool>,
}

impl UpdateWebhookEndpointRequest {
    /// Checks if the request has any updates.
    pub fn has_updates(&self) -> bool {
        self.name.is_some() || self.url.is_some() || self.events.is_some() || self.is_active.is_some()
    }

    /// Converts the request into a store patch, validating event names.
    pub fn to_patch(&self) -> Result<EndpointPatch, String> {
        let subscribed_events = match &self.events {
            Some(names) => Some(parse_subscribed_events(names)?),
            None => None,
        };

        Ok(EndpointPatch {
            name: self.name.clone(),
            url: self.url.clone(),
            subscribed_events,
            is_active: self.is_active,
        })
    }
}

/// Response payload for endpoint operations. Never includes the secret.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookEndpointResponse {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    pub events: Vec<WebhookEventType>,
    pub is_active: bool,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<WebhookEndpoint> for WebhookEndpointResponse {
    fn from(e: WebhookEndpoint) -> Self {
        Self {
            id: e.id,
            name: e.name,
            url: e.url,
            events: e.subscribed_events,
            is_active: e.is_active,
            last_triggered_at: e.last_triggered_at,
            created_at: e.created_at,
            updated_at: e.updated_at,
        }
    }
}

/// Response for endpoint creation: the only response besides rotation that
/// carries the plaintext secret.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedWebhookEndpointResponse {
    #[serde(flatten)]
    pub endpoint: WebhookEndpointResponse,
    pub secret: String,
}

impl From<WebhookEndpoint> for CreatedWebhookEndpointResponse {
    fn from(e: WebhookEndpoint) -> Self {
        let secret = e.secret.clone();
        Self {
            endpoint: e.into(),
            secret,
        }
    }
}

/// Response for secret rotation.
#[derive(Debug, Clone, Serialize)]
pub struct RotateSecretResponse {
    pub id: Uuid,
    pub secret: String,
    pub rotated_at: DateTime<Utc>,
}

/// Response for listing endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct ListWebhookEndpointsResponse {
    pub webhooks: Vec<WebhookEndpointResponse>,
    pub total: i64,
}

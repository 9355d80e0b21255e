//! Webhook delivery domain model.
//!
//! A delivery is one (event, endpoint) pair. It is pending until the worker
//! either delivers it or gives up on it; both outcomes are terminal.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

/// Maximum length of the response excerpt / error text kept per attempt.
pub const MAX_ERROR_LENGTH: usize = 1024;

/// Default page size for delivery listings.
pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// Delivery lifecycle state, derived from the terminal timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Delivered,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, DeliveryStatus::Pending)
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DeliveryStatus::Pending),
            "delivered" => Ok(DeliveryStatus::Delivered),
            "failed" => Ok(DeliveryStatus::Failed),
            other => Err(format!("Unknown delivery status: {}", other)),
        }
    }
}

/// A durable record of one event being delivered to one endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookDelivery {
    pub id: Uuid,
    /// Weak reference; the endpoint may have been disabled or deleted since.
    pub endpoint_id: Uuid,
    pub owner_id: Uuid,
    pub event_name: String,
    /// Immutable after creation.
    pub payload: serde_json::Value,
    pub attempt_count: i32,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_response_code: Option<i32>,
    pub last_error: Option<String>,
    /// Lease held by the worker currently attempting this delivery.
    pub claimed_until: Option<DateTime<Utc>>,
}

impl WebhookDelivery {
    pub fn status(&self) -> DeliveryStatus {
        if self.delivered_at.is_some() {
            DeliveryStatus::Delivered
        } else if self.failed_at.is_some() {
            DeliveryStatus::Failed
        } else {
            DeliveryStatus::Pending
        }
    }

    /// Time elapsed since the delivery was created.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.created_at
    }

    /// True when a retry has been scheduled for a later time.
    pub fn is_waiting_for_retry(&self, now: DateTime<Utc>) -> bool {
        self.next_retry_at.map(|at| at > now).unwrap_or(false)
    }

    /// True when another worker holds a live lease on this delivery.
    pub fn is_claimed(&self, now: DateTime<Utc>) -> bool {
        self.claimed_until.map(|until| until > now).unwrap_or(false)
    }
}

/// Values needed to insert a new pending delivery.
#[derive(Debug, Clone)]
pub struct NewDelivery {
    pub endpoint_id: Uuid,
    pub owner_id: Uuid,
    pub event_name: String,
    pub payload: serde_json::Value,
}

/// Per-status delivery counts for one endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryStats {
    pub pending: i64,
    pub delivered: i64,
    pub failed: i64,
}

impl DeliveryStats {
    pub fn total(&self) -> i64 {
        self.pending + self.delivered + self.failed
    }
}

/// Truncates an error message or response excerpt to the stored size.
pub fn truncate_error(message: &str) -> String {
    if message.len() <= MAX_ERROR_LENGTH {
        return message.to_string();
    }
    let mut end = MAX_ERROR_LENGTH;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    message[..end].to_string()
}

/// Query parameters for listing deliveries of an endpoint.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ListDeliveriesQuery {
    pub status: Option<DeliveryStatus>,

    #[validate(range(min = 1, max = 100, message = "limit must be between 1 and 100"))]
    pub limit: Option<i64>,

    #[validate(range(min = 0, message = "offset must not be negative"))]
    pub offset: Option<i64>,
}

impl ListDeliveriesQuery {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0)
    }
}

/// Response payload for a single delivery.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookDeliveryResponse {
    pub id: Uuid,
    pub endpoint_id: Uuid,
    pub event: String,
    pub status: DeliveryStatus,
    pub attempt_count: i32,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_response_code: Option<i32>,
    pub last_error: Option<String>,
}

impl From<WebhookDelivery> for WebhookDeliveryResponse {
    fn from(d: WebhookDelivery) -> Self {
        let status = d.status();
        Self {
            id: d.id,
            endpoint_id: d.endpoint_id,
            event: d.event_name,
            status,
            attempt_count: d.attempt_count,
            payload: d.payload,
            created_at: d.created_at,
            delivered_at: d.delivered_at,
            failed_at: d.failed_at,
            next_retry_at: d.next_retry_at,
            last_attempt_at: d.last_attempt_at,
            last_response_code: d.last_response_code,
            last_error: d.last_error,
        }
    }
}

/// Response for listing deliveries.
#[derive(Debug, Clone, Serialize)]
pub struct ListDeliveriesResponse {
    pub deliveries: Vec<WebhookDeliveryResponse>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Response for operations that queue a new delivery (test-send, redeliver).
#[derive(Debug, Clone, Serialize)]
pub struct QueuedDeliveryResponse {
    pub delivery_id: Uuid,
    pub endpoint_id: Uuid,
    pub event: String,
    pub status: DeliveryStatus,
}

impl From<&WebhookDelivery> for QueuedDeliveryResponse {
    fn from(d: &WebhookDelivery) -> Self {
        Self {
            delivery_id: d.id,
            endpoint_id: d.endpoint_id,
            event: d.event_name.clone(),
            status: d.status(),
        }
    }
}

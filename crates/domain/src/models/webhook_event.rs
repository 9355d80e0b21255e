//! Webhook event vocabulary and payload envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Header carrying the event name of an outbound delivery.
pub const EVENT_HEADER: &str = "X-Webhook-Event";

/// Header carrying the HMAC signature of an outbound delivery.
pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

/// Header carrying the delivery id, for receiver-side deduplication.
pub const DELIVERY_HEADER: &str = "X-Webhook-Delivery";

/// Events that can be delivered to webhook endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WebhookEventType {
    #[serde(rename = "client.created")]
    ClientCreated,
    #[serde(rename = "invoice.created")]
    InvoiceCreated,
    #[serde(rename = "invoice.sent")]
    InvoiceSent,
    #[serde(rename = "invoice.paid")]
    InvoicePaid,
    #[serde(rename = "invoice.overdue")]
    InvoiceOverdue,
    #[serde(rename = "quote.sent")]
    QuoteSent,
    #[serde(rename = "quote.accepted")]
    QuoteAccepted,
    #[serde(rename = "quote.rejected")]
    QuoteRejected,
    #[serde(rename = "lead.created")]
    LeadCreated,
    #[serde(rename = "lead.converted")]
    LeadConverted,
    #[serde(rename = "expense.created")]
    ExpenseCreated,
    #[serde(rename = "project.completed")]
    ProjectCompleted,
    /// Synthetic event sent by test-sends. Not subscribable.
    #[serde(rename = "webhook.test")]
    Test,
}

impl WebhookEventType {
    /// Events an endpoint may subscribe to.
    pub const SUBSCRIBABLE: &'static [WebhookEventType] = &[
        WebhookEventType::ClientCreated,
        WebhookEventType::InvoiceCreated,
        WebhookEventType::InvoiceSent,
        WebhookEventType::InvoicePaid,
        WebhookEventType::InvoiceOverdue,
        WebhookEventType::QuoteSent,
        WebhookEventType::QuoteAccepted,
        WebhookEventType::QuoteRejected,
        WebhookEventType::LeadCreated,
        WebhookEventType::LeadConverted,
        WebhookEventType::ExpenseCreated,
        WebhookEventType::ProjectCompleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookEventType::ClientCreated => "client.created",
            WebhookEventType::InvoiceCreated => "invoice.created",
            WebhookEventType::InvoiceSent => "invoice.sent",
            WebhookEventType::InvoicePaid => "invoice.paid",
            WebhookEventType::InvoiceOverdue => "invoice.overdue",
            WebhookEventType::QuoteSent => "quote.sent",
            WebhookEventType::QuoteAccepted => "quote.accepted",
            WebhookEventType::QuoteRejected => "quote.rejected",
            WebhookEventType::LeadCreated => "lead.created",
            WebhookEventType::LeadConverted => "lead.converted",
            WebhookEventType::ExpenseCreated => "expense.created",
            WebhookEventType::ProjectCompleted => "project.completed",
            WebhookEventType::Test => "webhook.test",
        }
    }

    /// Human readable description, shown by the event listing endpoint.
    pub fn description(&self) -> &'static str {
        match self {
            WebhookEventType::ClientCreated => "A client was created",
            WebhookEventType::InvoiceCreated => "An invoice was created",
            WebhookEventType::InvoiceSent => "An invoice was sent to the client",
            WebhookEventType::InvoicePaid => "An invoice was paid in full",
            WebhookEventType::InvoiceOverdue => "An invoice passed its due date unpaid",
            WebhookEventType::QuoteSent => "A quote was sent to the client",
            WebhookEventType::QuoteAccepted => "A quote was accepted",
            WebhookEventType::QuoteRejected => "A quote was rejected",
            WebhookEventType::LeadCreated => "A lead was created",
            WebhookEventType::LeadConverted => "A lead was converted to a client",
            WebhookEventType::ExpenseCreated => "An expense was recorded",
            WebhookEventType::ProjectCompleted => "A project was marked completed",
            WebhookEventType::Test => "Test delivery triggered from the management API",
        }
    }

    pub fn is_subscribable(&self) -> bool {
        !matches!(self, WebhookEventType::Test)
    }
}

impl fmt::Display for WebhookEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when an event name is not part of the vocabulary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Unsupported event type: {0}")]
pub struct ParseEventTypeError(pub String);

impl FromStr for WebhookEventType {
    type Err = ParseEventTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == WebhookEventType::Test.as_str() {
            return Ok(WebhookEventType::Test);
        }
        WebhookEventType::SUBSCRIBABLE
            .iter()
            .copied()
            .find(|event| event.as_str() == s)
            .ok_or_else(|| ParseEventTypeError(s.to_string()))
    }
}

/// Envelope serialized as the body of every delivery.
///
/// Built once per dispatched event and copied into each delivery row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub event_id: Uuid,
    pub event: WebhookEventType,
    pub occurred_at: DateTime<Utc>,
    pub owner_id: Uuid,
    pub data: serde_json::Value,
}

impl WebhookPayload {
    pub fn new(owner_id: Uuid, event: WebhookEventType, data: serde_json::Value) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event,
            occurred_at: Utc::now(),
            owner_id,
            data,
        }
    }
}

/// A single entry of the event listing endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct EventTypeInfo {
    pub name: &'static str,
    pub description: &'static str,
}

/// Response for listing subscribable events.
#[derive(Debug, Clone, Serialize)]
pub struct ListEventTypesResponse {
    pub events: Vec<EventTypeInfo>,
}

impl ListEventTypesResponse {
    pub fn subscribable() -> Self {
        Self {
            events: WebhookEventType::SUBSCRIBABLE
                .iter()
                .map(|event| EventTypeInfo {
                    name: event.as_str(),
                    description: event.description(),
                })
                .collect(),
        }
    }
}

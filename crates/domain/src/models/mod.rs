//! Domain models for webhook delivery.

pub mod webhook;
pub mod webhook_delivery;
pub mod webhook_event;

pub use webhook::{
    parse_subscribed_events, CreateWebhookEndpointRequest, CreatedWebhookEndpointResponse,
    EndpointPatch, ListWebhookEndpointsResponse, NewWebhookEndpoint, RotateSecretResponse,
    UpdateWebhookEndpointRequest, WebhookEndpoint, WebhookEndpointResponse,
};
pub use webhook_delivery::{
    truncate_error, DeliveryStats, DeliveryStatus, ListDeliveriesQuery, ListDeliveriesResponse,
    NewDelivery, QueuedDeliveryResponse, WebhookDelivery, WebhookDeliveryResponse,
    DEFAULT_PAGE_SIZE, MAX_ERROR_LENGTH,
};
pub use webhook_event::{
    EventTypeInfo, ListEventTypesResponse, ParseEventTypeError, WebhookEventType,
    WebhookPayload, DELIVERY_HEADER, EVENT_HEADER, SIGNATURE_HEADER,
};

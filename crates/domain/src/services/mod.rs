//! Domain services for webhook delivery.
//!
//! Services contain business logic that operates on domain models, plus the
//! storage and transport seams the application layer is written against.

pub mod retry_policy;
pub mod store;
pub mod transport;

pub use retry_policy::{
    FailureDecision, GiveUpReason, RetryPolicy, BACKOFF_SCHEDULE_SECS, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_RETRY_DEADLINE_SECS,
};
pub use store::{AttemptRecord, DeliveryPage, StoreError, WebhookDeliveryStore, WebhookEndpointStore};
pub use transport::{
    MockWebhookTransport, TransportError, TransportResponse, WebhookRequest, WebhookTransport,
};

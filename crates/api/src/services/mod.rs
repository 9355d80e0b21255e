//! Webhook delivery services: registry, fan-out, worker and audit.

pub mod audit;
pub mod delivery_queue;
pub mod delivery_worker;
pub mod dispatcher;
pub mod registry;
pub mod transport;
pub mod worker_pool;

pub use audit::{AuditError, DeliveryAudit};
pub use delivery_queue::DeliveryQueue;
pub use delivery_worker::{AttemptOutcome, DeliveryWorker, SkipReason, WorkerError, WorkerSettings};
pub use dispatcher::WebhookDispatcher;
pub use registry::{RegistryError, WebhookRegistry};
pub use transport::HttpWebhookTransport;
pub use worker_pool::DeliveryWorkerPool;

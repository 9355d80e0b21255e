//! Background job scheduler and job implementations.

mod pool_metrics;
mod scheduler;
mod webhook_retry;

pub use pool_metrics::PoolMetricsJob;
pub use scheduler::{Job, JobFrequency, JobScheduler};
pub use webhook_retry::{RetrySweep, WebhookRetryJob};

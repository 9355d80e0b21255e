//! Webhook retry background job.
//!
//! Each run first fails pending deliveries that outlived the retry deadline,
//! then re-enqueues pending deliveries whose retry time has come. This is how
//! deliveries dropped from the in-process queue (full queue, restart, crashed
//! worker) get attempted again.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use domain::services::{RetryPolicy, WebhookDeliveryStore};

use super::scheduler::{Job, JobFrequency};
use crate::middleware::metrics::record_delivery_terminal;
use crate::services::DeliveryQueue;

/// Background job to sweep expired deliveries and re-enqueue due ones.
pub struct WebhookRetryJob {
    deliveries: Arc<dyn WebhookDeliveryStore>,
    queue: DeliveryQueue,
    policy: RetryPolicy,
    interval_secs: u64,
    batch_size: i64,
}

/// What a single run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetrySweep {
    pub expired: usize,
    pub enqueued: usize,
}

impl WebhookRetryJob {
    pub fn new(
        deliveries: Arc<dyn WebhookDeliveryStore>,
        queue: DeliveryQueue,
        policy: RetryPolicy,
        interval_secs: u64,
        batch_size: i64,
    ) -> Self {
        Self {
            deliveries,
            queue,
            policy,
            interval_secs,
            batch_size,
        }
    }

    pub async fn run_once(&self) -> Result<RetrySweep, String> {
        let now = Utc::now();

        let expired = self
            .deliveries
            .fail_expired(self.policy.deadline_cutoff(now), now)
            .await
            .map_err(|e| format!("Failed to expire webhook deliveries: {}", e))?;

        if !expired.is_empty() {
            record_delivery_terminal("failed", expired.len());
            for id in &expired {
                warn!(delivery_id = %id, "Webhook delivery permanently failed: retry deadline exceeded");
            }
        }

        let due = self
            .deliveries
            .find_due(now, self.batch_size)
            .await
            .map_err(|e| format!("Failed to load due webhook deliveries: {}", e))?;

        let enqueued = due.iter().filter(|id| self.queue.enqueue(**id)).count();

        Ok(RetrySweep {
            expired: expired.len(),
            enqueued,
        })
    }
}

#[async_trait::async_trait]
impl Job for WebhookRetryJob {
    fn name(&self) -> &'static str {
        "webhook_retry"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Seconds(self.interval_secs)
    }

    async fn execute(&self) -> Result<(), String> {
        let sweep = self.run_once().await?;

        if sweep != RetrySweep::default() {
            info!(
                expired = sweep.expired,
                enqueued = sweep.enqueued,
                batch_size = self.batch_size,
                "Processed webhook retries"
            );
        }

        Ok(())
    }
}

//! Delivery worker: performs one HTTP attempt for one delivery.
//!
//! A delivery is pending until it is delivered or given up on. Each call to
//! [`DeliveryWorker::process`] either skips the delivery without touching it
//! or makes exactly one signed POST and records the result:
//!
//! - 2xx: delivered (terminal), endpoint `last_triggered_at` updated
//! - anything else: retry after the backoff for the new attempt count, or
//!   permanently failed once the attempt budget or the deadline is spent
//!
//! Transient failures never escape as errors; `Err` means the store itself
//! failed.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use domain::models::{
    truncate_error, DeliveryStatus, WebhookDelivery, WebhookEndpoint, DELIVERY_HEADER,
    EVENT_HEADER, SIGNATURE_HEADER,
};
use domain::services::{
    AttemptRecord, FailureDecision, GiveUpReason, RetryPolicy, StoreError, TransportResponse,
    WebhookDeliveryStore, WebhookEndpointStore, WebhookRequest, WebhookTransport,
};
use shared::crypto::sign_payload;

use super::transport::user_agent;
use crate::middleware::metrics::{record_delivery_attempt, record_delivery_terminal, AttemptMetric};

/// Why a delivery was left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    DeliveryNotFound,
    AlreadyDelivered,
    AlreadyFailed,
    NotYetDue,
    EndpointMissing,
    EndpointInactive,
    /// Another worker holds the claim.
    ClaimLost,
}

/// Result of processing one delivery id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Delivered {
        attempt_count: i32,
    },
    RetryScheduled {
        attempt_count: i32,
        next_retry_at: DateTime<Utc>,
    },
    PermanentlyFailed {
        attempt_count: i32,
        reason: GiveUpReason,
    },
    Skipped(SkipReason),
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Failed to serialize payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Worker settings.
#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    pub policy: RetryPolicy,
    /// Must outlive the transport timeout.
    pub claim_lease: Duration,
    /// How long a delivery for a missing or inactive endpoint is kept out of
    /// the due scan.
    pub skip_recheck: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            policy: RetryPolicy::default(),
            claim_lease: Duration::seconds(60),
            skip_recheck: Duration::seconds(60),
        }
    }
}

pub struct DeliveryWorker {
    endpoints: Arc<dyn WebhookEndpointStore>,
    deliveries: Arc<dyn WebhookDeliveryStore>,
    transport: Arc<dyn WebhookTransport>,
    settings: WorkerSettings,
}

/// Builds the signed POST for a delivery.
pub fn build_request(
    delivery: &WebhookDelivery,
    endpoint: &WebhookEndpoint,
) -> Result<WebhookRequest, serde_json::Error> {
    let body = serde_json::to_vec(&delivery.payload)?;
    let signature = sign_payload(&endpoint.secret, &body);

    Ok(WebhookRequest {
        url: endpoint.url.clone(),
        headers: vec![
            ("Content-Type", "application/json".to_string()),
            ("User-Agent", user_agent()),
            (EVENT_HEADER, delivery.event_name.clone()),
            (SIGNATURE_HEADER, signature),
            (DELIVERY_HEADER, delivery.id.to_string()),
        ],
        body,
    })
}

fn failure_text(response: &TransportResponse) -> String {
    let excerpt = response.body.trim();
    if excerpt.is_empty() {
        format!("HTTP {}", response.status)
    } else {
        truncate_error(&format!("HTTP {}: {}", response.status, excerpt))
    }
}

impl DeliveryWorker {
    pub fn new(
        endpoints: Arc<dyn WebhookEndpointStore>,
        deliveries: Arc<dyn WebhookDeliveryStore>,
        transport: Arc<dyn WebhookTransport>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            endpoints,
            deliveries,
            transport,
            settings,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.settings.policy
    }

    /// Processes one delivery id.
    pub async fn process(&self, delivery_id: Uuid) -> Result<AttemptOutcome, WorkerError> {
        let Some(delivery) = self.deliveries.find_by_id(delivery_id).await? else {
            info!(delivery_id = %delivery_id, "Webhook delivery not found, skipping");
            return Ok(AttemptOutcome::Skipped(SkipReason::DeliveryNotFound));
        };

        match delivery.status() {
            DeliveryStatus::Delivered => {
                info!(delivery_id = %delivery_id, "Webhook delivery already delivered, skipping");
                return Ok(AttemptOutcome::Skipped(SkipReason::AlreadyDelivered));
            }
            DeliveryStatus::Failed => {
                info!(delivery_id = %delivery_id, "Webhook delivery already failed, skipping");
                return Ok(AttemptOutcome::Skipped(SkipReason::AlreadyFailed));
            }
            DeliveryStatus::Pending => {}
        }

        let now = Utc::now();
        if delivery.is_waiting_for_retry(now) {
            debug!(
                delivery_id = %delivery_id,
                next_retry_at = ?delivery.next_retry_at,
                "Webhook delivery not yet due, skipping"
            );
            return Ok(AttemptOutcome::Skipped(SkipReason::NotYetDue));
        }

        let endpoint = match self.endpoints.find_by_id(delivery.endpoint_id).await? {
            Some(endpoint) if endpoint.owner_id == delivery.owner_id => endpoint,
            _ => {
                warn!(
                    delivery_id = %delivery_id,
                    endpoint_id = %delivery.endpoint_id,
                    "Webhook endpoint not found, skipping delivery"
                );
                self.park(delivery.id, now).await?;
                return Ok(AttemptOutcome::Skipped(SkipReason::EndpointMissing));
            }
        };

        if !endpoint.is_active {
            info!(
                delivery_id = %delivery_id,
                endpoint_id = %endpoint.id,
                "Webhook endpoint inactive, skipping delivery"
            );
            self.park(delivery.id, now).await?;
            return Ok(AttemptOutcome::Skipped(SkipReason::EndpointInactive));
        }

        let policy = self.settings.policy;
        if policy.budget_exhausted(delivery.attempt_count) {
            // Only reachable when max_attempts was lowered after the attempts were made.
            self.deliveries.mark_failed(delivery.id, None, now).await?;
            record_delivery_terminal("failed", 1);
            error!(
                delivery_id = %delivery_id,
                endpoint_id = %endpoint.id,
                attempt_count = delivery.attempt_count,
                "Webhook delivery permanently failed"
            );
            return Ok(AttemptOutcome::PermanentlyFailed {
                attempt_count: delivery.attempt_count,
                reason: GiveUpReason::AttemptsExhausted,
            });
        }

        let request = build_request(&delivery, &endpoint)?;

        if !self
            .deliveries
            .claim(delivery.id, now, now + self.settings.claim_lease)
            .await?
        {
            debug!(delivery_id = %delivery_id, "Webhook delivery claimed elsewhere, skipping");
            return Ok(AttemptOutcome::Skipped(SkipReason::ClaimLost));
        }

        let result = self.transport.send(request).await;
        let attempted_at = Utc::now();

        match result {
            Ok(response) if response.is_success() => {
                self.on_success(&delivery, &endpoint, response.status, attempted_at)
                    .await
            }
            Ok(response) => {
                record_delivery_attempt(AttemptMetric::HttpError);
                let error = failure_text(&response);
                self.on_failure(
                    &delivery,
                    Some(i32::from(response.status)),
                    error,
                    attempted_at,
                )
                .await
            }
            Err(e) => {
                record_delivery_attempt(AttemptMetric::TransportError);
                self.on_failure(&delivery, None, truncate_error(&e.to_string()), attempted_at)
                    .await
            }
        }
    }

    /// Pushes a skipped delivery behind the due ones. The attempt count is
    /// left alone.
    async fn park(&self, id: Uuid, now: DateTime<Utc>) -> Result<(), WorkerError> {
        self.deliveries
            .postpone(id, now, now + self.settings.skip_recheck)
            .await?;
        Ok(())
    }

    async fn on_success(
        &self,
        delivery: &WebhookDelivery,
        endpoint: &WebhookEndpoint,
        status: u16,
        attempted_at: DateTime<Utc>,
    ) -> Result<AttemptOutcome, WorkerError> {
        record_delivery_attempt(AttemptMetric::Success);
        let attempt_count = (delivery.attempt_count + 1).min(self.settings.policy.max_attempts);

        self.deliveries
            .mark_delivered(
                delivery.id,
                &AttemptRecord {
                    attempt_count,
                    attempted_at,
                    response_code: Some(i32::from(status)),
                    error: None,
                },
            )
            .await?;
        record_delivery_terminal("delivered", 1);

        if let Err(e) = self.endpoints.mark_triggered(endpoint.id, attempted_at).await {
            warn!(
                endpoint_id = %endpoint.id,
                error = %e,
                "Failed to update webhook endpoint last_triggered_at"
            );
        }

        info!(
            delivery_id = %delivery.id,
            endpoint_id = %endpoint.id,
            event = %delivery.event_name,
            status_code = status,
            attempt_count = attempt_count,
            "Webhook delivered"
        );

        Ok(AttemptOutcome::Delivered { attempt_count })
    }

    async fn on_failure(
        &self,
        delivery: &WebhookDelivery,
        response_code: Option<i32>,
        error: String,
        attempted_at: DateTime<Utc>,
    ) -> Result<AttemptOutcome, WorkerError> {
        let decision = self.settings.policy.on_failure(
            delivery.attempt_count,
            delivery.created_at,
            attempted_at,
        );

        match decision {
            FailureDecision::Retry {
                attempt_count,
                next_retry_at,
            } => {
                let record = AttemptRecord {
                    attempt_count,
                    attempted_at,
                    response_code,
                    error: Some(error),
                };
                self.deliveries
                    .schedule_retry(delivery.id, &record, next_retry_at)
                    .await?;

                warn!(
                    delivery_id = %delivery.id,
                    endpoint_id = %delivery.endpoint_id,
                    attempt_count = attempt_count,
                    status_code = ?response_code,
                    error = record.error.as_deref().unwrap_or_default(),
                    next_retry_at = %next_retry_at,
                    "Webhook delivery attempt failed, will retry"
                );

                Ok(AttemptOutcome::RetryScheduled {
                    attempt_count,
                    next_retry_at,
                })
            }
            FailureDecision::GiveUp {
                attempt_count,
                reason,
            } => {
                let record = AttemptRecord {
                    attempt_count,
                    attempted_at,
                    response_code,
                    error: Some(error),
                };
                self.deliveries
                    .mark_failed(delivery.id, Some(&record), attempted_at)
                    .await?;
                record_delivery_terminal("failed", 1);

                error!(
                    delivery_id = %delivery.id,
                    endpoint_id = %delivery.endpoint_id,
                    attempt_count = attempt_count,
                    status_code = ?response_code,
                    reason = %reason,
                    "Webhook delivery permanently failed"
                );

                Ok(AttemptOutcome::PermanentlyFailed {
                    attempt_count,
                    reason,
                })
            }
        }
    }
}

//! In-process queue of delivery ids waiting for an attempt.
//!
//! The queue is not durable. Delivery rows are the system of record; anything
//! dropped here is found again by the retry job.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};
use uuid::Uuid;

/// Sending half of the delivery queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct DeliveryQueue {
    sender: mpsc::Sender<Uuid>,
}

impl DeliveryQueue {
    /// Creates a bounded queue and returns the receiver for the worker pool.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Uuid>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    /// Enqueues a delivery for an immediate attempt. Never blocks.
    ///
    /// Returns false when the id was not queued.
    pub fn enqueue(&self, delivery_id: Uuid) -> bool {
        match self.sender.try_send(delivery_id) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(
                    delivery_id = %delivery_id,
                    "Delivery queue full, leaving delivery for the retry job"
                );
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(delivery_id = %delivery_id, "Delivery queue closed");
                false
            }
        }
    }

    /// Enqueues a delivery once `at` has passed.
    ///
    /// Best effort: the timer is a detached task that does not survive a
    /// restart, and one is spawned per scheduled retry. The retry job
    /// re-enqueues any due delivery whose timer was lost.
    pub fn enqueue_at(&self, delivery_id: Uuid, at: DateTime<Utc>) {
        let delay = (at - Utc::now()).to_std().unwrap_or_default();
        if delay.is_zero() {
            self.enqueue(delivery_id);
            return;
        }

        let sender = self.sender.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if sender.send(delivery_id).await.is_err() {
                debug!(delivery_id = %delivery_id, "Delivery queue closed before retry");
            }
        });
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

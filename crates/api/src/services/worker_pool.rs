//! Worker pool consuming the delivery queue.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::delivery_queue::DeliveryQueue;
use super::delivery_worker::{AttemptOutcome, DeliveryWorker};

/// Runs [`DeliveryWorker::process`] for queued ids with bounded concurrency.
pub struct DeliveryWorkerPool {
    worker: Arc<DeliveryWorker>,
    queue: DeliveryQueue,
    concurrency: usize,
}

impl DeliveryWorkerPool {
    pub fn new(worker: Arc<DeliveryWorker>, queue: DeliveryQueue, concurrency: usize) -> Self {
        Self {
            worker,
            queue,
            concurrency: concurrency.max(1),
        }
    }

    /// Starts the receive loop. It stops when `shutdown` flips to true or the
    /// queue closes, then waits up to `drain_timeout` for in-flight attempts.
    pub fn spawn(
        self,
        receiver: mpsc::Receiver<Uuid>,
        shutdown: watch::Receiver<bool>,
        drain_timeout: Duration,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(receiver, shutdown, drain_timeout))
    }

    async fn run(
        self,
        mut receiver: mpsc::Receiver<Uuid>,
        mut shutdown: watch::Receiver<bool>,
        drain_timeout: Duration,
    ) {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        info!(concurrency = self.concurrency, "Delivery worker pool started");

        loop {
            let next = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                next = receiver.recv() => next,
            };

            let Some(delivery_id) = next else {
                break;
            };

            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            let worker = Arc::clone(&self.worker);
            let queue = self.queue.clone();

            tokio::spawn(async move {
                let _permit = permit;
                handle(&worker, &queue, delivery_id).await;
            });
        }

        info!("Delivery worker pool draining");
        let drained = tokio::time::timeout(
            drain_timeout,
            semaphore.acquire_many(self.concurrency as u32),
        )
        .await;
        match drained {
            Ok(_) => info!("Delivery worker pool stopped"),
            Err(_) => warn!(
                "Delivery worker pool stopped with attempts in flight after {:?}",
                drain_timeout
            ),
        }
    }
}

/// Processes one id and schedules the follow-up attempt when needed.
async fn handle(worker: &DeliveryWorker, queue: &DeliveryQueue, delivery_id: Uuid) {
    match worker.process(delivery_id).await {
        Ok(AttemptOutcome::RetryScheduled { next_retry_at, .. }) => {
            queue.enqueue_at(delivery_id, next_retry_at);
        }
        Ok(_) => {}
        Err(e) => {
            // The row is still pending; the retry job picks it up once the claim lapses.
            error!(delivery_id = %delivery_id, error = %e, "Webhook delivery processing failed");
        }
    }
}

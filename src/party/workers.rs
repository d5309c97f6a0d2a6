//! Thin adapters binding each job queue to its service: poll, and on a due
//! job, run the service; on startup, run once immediately to catch up on
//! work that accumulated while the worker was down.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::kernel::job_bus::{JobBus, QUEUE_CHECKIN_EXPIRED, QUEUE_DEQUEUE, QUEUE_SEAT_EXPIRED};

use super::checkin_expiry_service::CheckinExpiryService;
use super::dequeue_service::DequeueService;
use super::seat_expiry_service::SeatExpiryService;

/// A single-queue, single-worker long-running task. Mirrors the job
/// worker's poll/backoff/shutdown shape, simplified: our queues carry no
/// payload, so "claim" is just "is anything due".
#[async_trait]
pub trait Worker: Send + Sync {
    fn name(&self) -> &'static str;
    fn queue(&self) -> &'static str;

    async fn run_once(&self) -> anyhow::Result<()>;

    async fn run(self: Box<Self>, job_bus: Arc<dyn JobBus>, shutdown: CancellationToken) {
        info!(worker = self.name(), "worker starting");

        if let Err(err) = self.run_once().await {
            error!(worker = self.name(), error = %err, "initial catch-up run failed");
        }

        let min_poll_interval = Duration::from_millis(100);
        let max_poll_interval = Duration::from_secs(5);
        let mut current_interval = min_poll_interval;

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            match job_bus.poll_due(self.queue()).await {
                Ok(Some(())) => {
                    current_interval = min_poll_interval;
                    if let Err(err) = self.run_once().await {
                        error!(worker = self.name(), error = %err, "service run failed");
                    } else {
                        debug!(worker = self.name(), "service run completed");
                    }
                }
                Ok(None) => {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(current_interval) => {}
                    }
                    current_interval = (current_interval * 2).min(max_poll_interval);
                }
                Err(err) => {
                    warn!(worker = self.name(), error = %err, "failed to poll job bus");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }

        info!(worker = self.name(), "worker stopped");
    }
}

pub struct DequeueWorker(pub Arc<DequeueService>);

#[async_trait]
impl Worker for DequeueWorker {
    fn name(&self) -> &'static str {
        "dequeue-worker"
    }

    fn queue(&self) -> &'static str {
        QUEUE_DEQUEUE
    }

    async fn run_once(&self) -> anyhow::Result<()> {
        self.0.run().await.map_err(Into::into)
    }
}

pub struct CheckinExpiryWorker(pub Arc<CheckinExpiryService>);

#[async_trait]
impl Worker for CheckinExpiryWorker {
    fn name(&self) -> &'static str {
        "checkin-expiry-worker"
    }

    fn queue(&self) -> &'static str {
        QUEUE_CHECKIN_EXPIRED
    }

    async fn run_once(&self) -> anyhow::Result<()> {
        self.0.run().await.map_err(Into::into)
    }
}

pub struct SeatExpiryWorker(pub Arc<SeatExpiryService>);

#[async_trait]
impl Worker for SeatExpiryWorker {
    fn name(&self) -> &'static str {
        "seat-expiry-worker"
    }

    fn queue(&self) -> &'static str {
        QUEUE_SEAT_EXPIRED
    }

    async fn run_once(&self) -> anyhow::Result<()> {
        self.0.run().await.map_err(Into::into)
    }
}

//! Wiring of queue, worker and shutdown into one service.

use std::sync::Arc;

use chrono::Utc;
use invite_core::{
    Acknowledgment, ConfigError, Job, JobEvent, ReplyTarget, WorkerConfig, WorkerState,
};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::client::{JoinClient, OutcomeReporter};
use crate::messages::QueueError;
use crate::queue_actor::JobQueue;
use crate::rate_limiter::RateLimiter;
use crate::shutdown::{ShutdownCoordinator, ShutdownReport};
use crate::worker::Worker;

/// Errors starting the service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}

/// Entry point for the command layer.
///
/// Owns the queue actor, the running worker task and the shutdown
/// coordinator.
pub struct JoinService {
    queue: JobQueue,
    event_tx: broadcast::Sender<JobEvent>,
    coordinator: Arc<ShutdownCoordinator>,
}

impl JoinService {
    /// Spawn the queue actor and the worker task.
    pub async fn start(
        config: &WorkerConfig,
        client: Arc<dyn JoinClient>,
        reporter: Arc<dyn OutcomeReporter>,
    ) -> Result<Self, ServiceError> {
        config.validate()?;
        tracing::info!(
            "Starting join worker ({} joins per {}s)",
            config.rate_limit_count,
            config.rate_limit_window_secs
        );

        let (event_tx, _) = broadcast::channel(config.event_capacity);
        let (queue, _queue_handle) = JobQueue::spawn().await?;

        let worker = Worker::new(
            queue.clone(),
            RateLimiter::from_config(config),
            client,
            reporter,
        )
        .with_event_tx(event_tx.clone());

        let in_flight = worker.in_flight();
        let cancel = CancellationToken::new();
        let worker_handle = tokio::spawn(worker.run(cancel.clone()));

        let coordinator = ShutdownCoordinator::new(
            queue.clone(),
            cancel,
            worker_handle,
            in_flight,
            config.shutdown_grace(),
        )
        .with_event_tx(event_tx.clone());

        Ok(Self {
            queue,
            event_tx,
            coordinator: Arc::new(coordinator),
        })
    }

    /// Queue a join request and acknowledge it immediately.
    pub fn request_join(
        &self,
        requester: ReplyTarget,
        target_ref: impl Into<String>,
    ) -> Result<Acknowledgment, QueueError> {
        let job = Job::new(requester, target_ref);
        let ack = Acknowledgment {
            job_id: job.id,
            target_ref: job.target_ref.clone(),
        };

        self.queue.enqueue(job)?;
        tracing::info!("{}", ack);

        let _ = self.event_tx.send(JobEvent::JobEnqueued {
            job_id: ack.job_id,
            target_ref: ack.target_ref.clone(),
            timestamp: Utc::now(),
        });

        Ok(ack)
    }

    /// Subscribe to job and worker events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.event_tx.subscribe()
    }

    pub fn state(&self) -> WorkerState {
        self.coordinator.state()
    }

    pub fn coordinator(&self) -> Arc<ShutdownCoordinator> {
        Arc::clone(&self.coordinator)
    }

    /// Number of jobs waiting behind the one in flight.
    pub async fn pending(&self) -> Result<usize, QueueError> {
        self.queue.len().await
    }

    pub async fn shutdown(&self, reason: &str) -> ShutdownReport {
        self.coordinator.shutdown(reason).await
    }
}

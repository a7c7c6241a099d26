//! The single worker that drains the join queue.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::FutureExt;
use invite_core::{Job, JobEvent, JobId, Outcome, RemoteError, ReplyTarget};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use crate::client::{JoinClient, JoinResult, OutcomeReporter};
use crate::queue_actor::JobQueue;
use crate::rate_limiter::RateLimiter;
use crate::retry::{RetryDecision, RetryPolicy};

/// Where the worker is with its current job.
#[derive(Debug)]
enum Phase {
    Idle,
    Admitting(Job),
    Calling(Job),
    Succeeded(Job, String),
    Failed(Job, Outcome),
    Retrying(Job, Duration),
}

impl Phase {
    fn name(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Admitting(_) => "admitting",
            Phase::Calling(_) => "calling",
            Phase::Succeeded(..) => "succeeded",
            Phase::Failed(..) => "failed",
            Phase::Retrying(..) => "retrying",
        }
    }

    fn job_id(&self) -> Option<JobId> {
        match self {
            Phase::Idle => None,
            Phase::Admitting(job)
            | Phase::Calling(job)
            | Phase::Succeeded(job, _)
            | Phase::Failed(job, _)
            | Phase::Retrying(job, _) => Some(job.id),
        }
    }
}

/// Why the worker loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// The queue was closed and had nothing left.
    QueueClosed,
    /// Cancellation was requested; `abandoned` is the job that was in flight.
    Cancelled { abandoned: Option<JobId> },
}

impl WorkerExit {
    pub fn abandoned(&self) -> Option<JobId> {
        match self {
            WorkerExit::Cancelled { abandoned } => *abandoned,
            WorkerExit::QueueClosed => None,
        }
    }
}

/// Slot holding the job the worker currently owns.
///
/// Shared with the shutdown coordinator. Whoever takes the id first reports
/// the job as abandoned.
#[derive(Clone)]
pub struct InFlight(Arc<watch::Sender<Option<JobId>>>);

impl InFlight {
    pub fn new() -> Self {
        Self(Arc::new(watch::channel(None).0))
    }

    /// Clear the slot, returning the job that was in it.
    pub fn take(&self) -> Option<JobId> {
        self.0.send_replace(None)
    }

    fn set(&self, job_id: Option<JobId>) {
        self.0.send_replace(job_id);
    }
}

impl Default for InFlight {
    fn default() -> Self {
        Self::new()
    }
}

/// Pulls jobs one at a time, rate-limits them, calls the remote service and
/// reports the outcome.
///
/// Every terminal outcome is reported exactly once. A throttled job gets one
/// `ThrottledRetryScheduled` notification per throttle and is moved back to
/// the tail of the queue after the server's delay.
pub struct Worker {
    queue: JobQueue,
    limiter: RateLimiter,
    policy: RetryPolicy,
    client: Arc<dyn JoinClient>,
    reporter: Arc<dyn OutcomeReporter>,
    event_tx: Option<broadcast::Sender<JobEvent>>,
    /// Attempts per job still in the system, for events.
    attempts: HashMap<JobId, u32>,
    in_flight: InFlight,
}

impl Worker {
    pub fn new(
        queue: JobQueue,
        limiter: RateLimiter,
        client: Arc<dyn JoinClient>,
        reporter: Arc<dyn OutcomeReporter>,
    ) -> Self {
        Self {
            queue,
            limiter,
            policy: RetryPolicy::new(),
            client,
            reporter,
            event_tx: None,
            attempts: HashMap::new(),
            in_flight: InFlight::new(),
        }
    }

    /// Set the event broadcaster.
    pub fn with_event_tx(mut self, tx: broadcast::Sender<JobEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// The slot tracking the job this worker holds.
    pub fn in_flight(&self) -> InFlight {
        self.in_flight.clone()
    }

    /// Run until the queue closes or `cancel` fires.
    ///
    /// Cancellation is observed at every suspension point after a job has
    /// been taken: the limiter, the remote call, outcome delivery and the
    /// throttle sleep. The job in flight is dropped without a further report.
    ///
    /// Waiting for a job is not raced against `cancel`, since a job already
    /// sent into the dequeue reply would be lost with the future. The
    /// canceller closes the queue to release that wait, and a job that
    /// arrives after cancellation is abandoned like any other.
    pub async fn run(mut self, cancel: CancellationToken) -> WorkerExit {
        tracing::info!("Join worker started");
        let mut phase = Phase::Idle;

        loop {
            self.in_flight.set(phase.job_id());
            let dequeuing = matches!(phase, Phase::Idle);

            let stepped = match phase {
                Phase::Idle => Some(self.step(Phase::Idle).await),
                phase => tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    next = self.step(phase) => Some(next),
                },
            };

            match stepped {
                Some(Some(next)) if cancel.is_cancelled() => {
                    // Otherwise the slot still names this job, unless the
                    // coordinator already took it.
                    if dequeuing || next.job_id().is_none() {
                        self.in_flight.set(next.job_id());
                    }
                    return self.abandon();
                }
                Some(Some(next)) => {
                    tracing::debug!("Worker -> {}", next.name());
                    phase = next;
                }
                Some(None) if cancel.is_cancelled() => {
                    self.in_flight.set(None);
                    return self.abandon();
                }
                Some(None) => {
                    tracing::info!("Job queue closed, worker exiting");
                    return WorkerExit::QueueClosed;
                }
                None => return self.abandon(),
            }
        }
    }

    fn abandon(&mut self) -> WorkerExit {
        let job_id = self.in_flight.take();
        if let Some(job_id) = job_id {
            tracing::info!("Abandoning job {} on shutdown", job_id);
            self.attempts.remove(&job_id);
            self.broadcast(JobEvent::JobAbandoned {
                job_id,
                timestamp: Utc::now(),
            });
        }
        tracing::info!("Join worker stopped");
        WorkerExit::Cancelled { abandoned: job_id }
    }

    /// Advance one transition. `None` means the queue is closed.
    async fn step(&mut self, phase: Phase) -> Option<Phase> {
        match phase {
            Phase::Idle => match self.queue.dequeue().await {
                Ok(Some(job)) => Some(Phase::Admitting(job)),
                Ok(None) => None,
                Err(e) => {
                    tracing::error!("Job queue unavailable: {}", e);
                    None
                }
            },

            Phase::Admitting(job) => {
                let waited = self.limiter.admit().await;
                if !waited.is_zero() {
                    tracing::debug!("Job {} admitted after {:?}", job.id, waited);
                }
                Some(Phase::Calling(job))
            }

            Phase::Calling(job) => {
                let attempt = {
                    let count = self.attempts.entry(job.id).or_insert(0);
                    *count += 1;
                    *count
                };
                self.broadcast(JobEvent::JobStarted {
                    job_id: job.id,
                    target_ref: job.target_ref.clone(),
                    attempt,
                    timestamp: Utc::now(),
                });

                match self.call(&job.target_ref).await {
                    Ok(server_name) => Some(Phase::Succeeded(job, server_name)),
                    Err(error) => match self.policy.classify(&job.target_ref, &error) {
                        RetryDecision::Retry { delay } => {
                            tracing::warn!(
                                "Rate limited, retrying after {:.2} seconds...",
                                delay.as_secs_f64()
                            );
                            Some(Phase::Retrying(job, delay))
                        }
                        RetryDecision::Fail(outcome) => {
                            tracing::error!("Join for {} failed: {}", job.target_ref, error);
                            Some(Phase::Failed(job, outcome))
                        }
                    },
                }
            }

            Phase::Succeeded(job, server_name) => {
                tracing::info!("Successfully joined the server: {}", server_name);
                self.broadcast(JobEvent::JobSucceeded {
                    job_id: job.id,
                    server_name: server_name.clone(),
                    timestamp: Utc::now(),
                });
                self.finish(job, Outcome::Success { server_name }).await;
                Some(Phase::Idle)
            }

            Phase::Failed(job, outcome) => {
                self.broadcast(JobEvent::JobFailed {
                    job_id: job.id,
                    error: outcome.to_string(),
                    timestamp: Utc::now(),
                });
                self.finish(job, outcome).await;
                Some(Phase::Idle)
            }

            Phase::Retrying(job, delay) => {
                self.broadcast(JobEvent::JobRetrying {
                    job_id: job.id,
                    delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    timestamp: Utc::now(),
                });
                self.report(
                    &job.requester,
                    &Outcome::ThrottledRetryScheduled { delay },
                )
                .await;
                tokio::time::sleep(delay).await;

                let job_id = job.id;
                if let Err(e) = self.queue.enqueue(job) {
                    tracing::error!("Failed to re-enqueue job {}: {}", job_id, e);
                    self.attempts.remove(&job_id);
                }
                Some(Phase::Idle)
            }
        }
    }

    /// Call the client, turning a panic into an unexpected error.
    async fn call(&self, target_ref: &str) -> JoinResult {
        let call = async { self.client.fetch_and_join(target_ref).await };
        match AssertUnwindSafe(call).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(RemoteError::unexpected(panic_message(panic.as_ref()))),
        }
    }

    async fn finish(&mut self, job: Job, outcome: Outcome) {
        self.attempts.remove(&job.id);
        self.report(&job.requester, &outcome).await;
    }

    async fn report(&self, target: &ReplyTarget, outcome: &Outcome) {
        if let Err(e) = self.reporter.report(target, outcome).await {
            tracing::warn!("Failed to report {} outcome: {}", outcome.as_str(), e);
        }
    }

    fn broadcast(&self, event: JobEvent) {
        if let Some(ref tx) = self.event_tx {
            let _ = tx.send(event);
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "join call panicked".to_string()
    }
}

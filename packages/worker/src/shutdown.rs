//! Graceful shutdown coordination.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use invite_core::{JobEvent, JobId, WorkerState};
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::queue_actor::JobQueue;
use crate::worker::{InFlight, WorkerExit};

/// What a call to [`ShutdownCoordinator::shutdown`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReport {
    /// This call performed the shutdown.
    Completed {
        /// The worker missed the grace period and was aborted.
        forced: bool,
        /// Job that was in flight when cancellation landed.
        abandoned_job: Option<JobId>,
        /// Jobs still waiting in the queue.
        abandoned_queued: usize,
    },
    /// Another call already started the shutdown; nothing was done.
    AlreadyDraining,
}

/// Stops the worker on a termination signal.
///
/// The first call moves the worker to `Draining`, cancels it, waits up to the
/// grace period for it to exit and then aborts it. Later calls return
/// [`ShutdownReport::AlreadyDraining`] without side effects.
pub struct ShutdownCoordinator {
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<WorkerExit>>>,
    in_flight: InFlight,
    queue: JobQueue,
    grace: Duration,
    draining: AtomicBool,
    state_tx: watch::Sender<WorkerState>,
    event_tx: Option<broadcast::Sender<JobEvent>>,
}

impl ShutdownCoordinator {
    pub fn new(
        queue: JobQueue,
        cancel: CancellationToken,
        worker: JoinHandle<WorkerExit>,
        in_flight: InFlight,
        grace: Duration,
    ) -> Self {
        let (state_tx, _) = watch::channel(WorkerState::Running);
        Self {
            cancel,
            worker: Mutex::new(Some(worker)),
            in_flight,
            queue,
            grace,
            draining: AtomicBool::new(false),
            state_tx,
            event_tx: None,
        }
    }

    /// Set the event broadcaster.
    pub fn with_event_tx(mut self, tx: broadcast::Sender<JobEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn state(&self) -> WorkerState {
        *self.state_tx.borrow()
    }

    /// Watch lifecycle changes.
    pub fn watch_state(&self) -> watch::Receiver<WorkerState> {
        self.state_tx.subscribe()
    }

    /// Resolve once the worker has reached `Stopped`.
    pub async fn stopped(&self) {
        let mut rx = self.state_tx.subscribe();
        let _ = rx.wait_for(|state| *state == WorkerState::Stopped).await;
    }

    pub async fn shutdown(&self, reason: &str) -> ShutdownReport {
        if self.draining.swap(true, Ordering::SeqCst) {
            tracing::debug!("Shutdown already in progress, ignoring {}", reason);
            return ShutdownReport::AlreadyDraining;
        }

        tracing::info!("Received exit signal {}...", reason);
        self.transition(WorkerState::Draining);

        tracing::info!("Closing running tasks...");
        self.cancel.cancel();
        // Releases a worker parked on an empty queue.
        let _ = self.queue.close();

        let handle = self.worker.lock().await.take();
        let (forced, abandoned_job) = match handle {
            Some(mut handle) => match tokio::time::timeout(self.grace, &mut handle).await {
                Ok(Ok(exit)) => (false, exit.abandoned()),
                Ok(Err(e)) => {
                    tracing::warn!("Worker task ended abnormally: {}", e);
                    (false, None)
                }
                Err(_) => {
                    tracing::warn!(
                        "Worker did not stop within {:.2} seconds, aborting",
                        self.grace.as_secs_f64()
                    );
                    handle.abort();
                    let abandoned = self.in_flight.take();
                    if let Some(job_id) = abandoned {
                        tracing::info!("Abandoning job {} on shutdown", job_id);
                        self.broadcast(JobEvent::JobAbandoned {
                            job_id,
                            timestamp: Utc::now(),
                        });
                    }
                    (true, abandoned)
                }
            },
            None => (false, None),
        };

        let abandoned_queued = match self.queue.len().await {
            Ok(len) => len,
            Err(e) => {
                tracing::warn!("Could not count queued jobs: {}", e);
                0
            }
        };
        if abandoned_queued > 0 {
            tracing::info!("Abandoning {} queued join requests", abandoned_queued);
        }
        self.queue.shutdown();

        self.transition(WorkerState::Stopped);
        tracing::info!("Shutdown complete.");

        ShutdownReport::Completed {
            forced,
            abandoned_job,
            abandoned_queued,
        }
    }

    /// Shut down on the first SIGINT/SIGTERM.
    ///
    /// The returned task finishes once the shutdown has completed, or when
    /// something else stopped the worker first.
    pub fn listen_for_signals(self: &Arc<Self>) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            let signal = tokio::select! {
                signal = wait_for_signal() => signal,
                _ = coordinator.stopped() => return,
            };
            match signal {
                Ok(name) => {
                    coordinator.shutdown(name).await;
                }
                Err(e) => tracing::error!("Failed to listen for signals: {}", e),
            }
        })
    }

    fn transition(&self, new_state: WorkerState) {
        let old_state = self.state_tx.send_replace(new_state);
        if old_state == new_state {
            return;
        }
        tracing::debug!("Worker {} -> {}", old_state, new_state);
        self.broadcast(JobEvent::WorkerStateChanged {
            old_state,
            new_state,
            timestamp: Utc::now(),
        });
    }

    fn broadcast(&self, event: JobEvent) {
        if let Some(ref tx) = self.event_tx {
            let _ = tx.send(event);
        }
    }
}

/// Wait for SIGINT (ctrl-c) or, on unix, SIGTERM. Returns the signal name.
pub async fn wait_for_signal() -> std::io::Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.map(|_| "SIGINT"),
            _ = terminate.recv() => Ok("SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        Ok("ctrl-c")
    }
}

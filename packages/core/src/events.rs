//! Event types for observing the join worker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::JobId;

/// Process-wide lifecycle of the single worker task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Worker is pulling and processing jobs.
    #[default]
    Running,
    /// Shutdown requested; the in-flight job is being cancelled.
    Draining,
    /// Worker has exited.
    Stopped,
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerState::Running => write!(f, "running"),
            WorkerState::Draining => write!(f, "draining"),
            WorkerState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Events emitted while join requests move through the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    /// A join request was queued.
    JobEnqueued {
        job_id: JobId,
        target_ref: String,
        timestamp: DateTime<Utc>,
    },
    /// The worker passed the limiter and is calling the remote service.
    JobStarted {
        job_id: JobId,
        target_ref: String,
        attempt: u32,
        timestamp: DateTime<Utc>,
    },
    /// The server was joined.
    JobSucceeded {
        job_id: JobId,
        server_name: String,
        timestamp: DateTime<Utc>,
    },
    /// The job failed permanently.
    JobFailed {
        job_id: JobId,
        error: String,
        timestamp: DateTime<Utc>,
    },
    /// The job was throttled and will go back to the queue after the delay.
    JobRetrying {
        job_id: JobId,
        delay_ms: u64,
        timestamp: DateTime<Utc>,
    },
    /// The job was dropped by shutdown without an outcome.
    JobAbandoned {
        job_id: JobId,
        timestamp: DateTime<Utc>,
    },
    /// The worker lifecycle changed.
    WorkerStateChanged {
        old_state: WorkerState,
        new_state: WorkerState,
        timestamp: DateTime<Utc>,
    },
}

impl JobEvent {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            JobEvent::JobEnqueued { timestamp, .. } => *timestamp,
            JobEvent::JobStarted { timestamp, .. } => *timestamp,
            JobEvent::JobSucceeded { timestamp, .. } => *timestamp,
            JobEvent::JobFailed { timestamp, .. } => *timestamp,
            JobEvent::JobRetrying { timestamp, .. } => *timestamp,
            JobEvent::JobAbandoned { timestamp, .. } => *timestamp,
            JobEvent::WorkerStateChanged { timestamp, .. } => *timestamp,
        }
    }

    /// Get the job ID associated with this event, if any.
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            JobEvent::JobEnqueued { job_id, .. } => Some(*job_id),
            JobEvent::JobStarted { job_id, .. } => Some(*job_id),
            JobEvent::JobSucceeded { job_id, .. } => Some(*job_id),
            JobEvent::JobFailed { job_id, .. } => Some(*job_id),
            JobEvent::JobRetrying { job_id, .. } => Some(*job_id),
            JobEvent::JobAbandoned { job_id, .. } => Some(*job_id),
            JobEvent::WorkerStateChanged { .. } => None,
        }
    }

    /// Get a short description of this event for logging.
    pub fn description(&self) -> String {
        match self {
            JobEvent::JobEnqueued {
                job_id, target_ref, ..
            } => format!("Job {} enqueued for {}", job_id, target_ref),
            JobEvent::JobStarted {
                job_id, attempt, ..
            } => format!("Job {} started (attempt {})", job_id, attempt),
            JobEvent::JobSucceeded {
                job_id,
                server_name,
                ..
            } => format!("Job {} joined {}", job_id, server_name),
            JobEvent::JobFailed { job_id, error, .. } => {
                format!("Job {} failed: {}", job_id, error)
            }
            JobEvent::JobRetrying {
                job_id, delay_ms, ..
            } => format!("Job {} retrying in {}ms", job_id, delay_ms),
            JobEvent::JobAbandoned { job_id, .. } => format!("Job {} abandoned", job_id),
            JobEvent::WorkerStateChanged {
                old_state,
                new_state,
                ..
            } => format!("Worker {} -> {}", old_state, new_state),
        }
    }
}

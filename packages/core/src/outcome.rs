//! Outcomes of join attempts and the errors a remote call can raise.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Result of processing a job, as reported to its requester.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// The invite was accepted.
    Success { server_name: String },
    /// The invite does not exist or has expired.
    NotFound { target_ref: String },
    /// The account is not allowed to join.
    Forbidden { target_ref: String },
    /// The remote service throttled the attempt; the job will be retried.
    ThrottledRetryScheduled { delay: Duration },
    /// Any other failure. The job is dropped.
    PermanentFailure { message: String },
}

impl Outcome {
    /// Whether this outcome ends the job's lifecycle.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Outcome::ThrottledRetryScheduled { .. })
    }

    /// Whether this is one of the permanent failure kinds.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Outcome::NotFound { .. } | Outcome::Forbidden { .. } | Outcome::PermanentFailure { .. }
        )
    }

    /// Get a simple outcome string for logs and events.
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success { .. } => "success",
            Outcome::NotFound { .. } => "not_found",
            Outcome::Forbidden { .. } => "forbidden",
            Outcome::ThrottledRetryScheduled { .. } => "throttled",
            Outcome::PermanentFailure { .. } => "failed",
        }
    }
}

/// Renders the reply text sent back to the requester.
impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Success { server_name } => {
                write!(f, "Successfully joined the server: {}", server_name)
            }
            Outcome::NotFound { target_ref } => write!(f, "Invite link not found: {}", target_ref),
            Outcome::Forbidden { target_ref } => {
                write!(f, "Bot lacks permission to join: {}", target_ref)
            }
            Outcome::ThrottledRetryScheduled { delay } => write!(
                f,
                "Rate limited, retrying after {:.2} seconds...",
                delay.as_secs_f64()
            ),
            Outcome::PermanentFailure { message } => {
                write!(f, "Failed to join the server: {}", message)
            }
        }
    }
}

/// Errors raised by the remote join call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RemoteError {
    #[error("Not found")]
    NotFound,

    #[error("Forbidden")]
    Forbidden,

    #[error("Throttled (retry after {retry_after:?})")]
    Throttled { retry_after: Option<Duration> },

    #[error("{message}")]
    Other { message: String },

    #[error("unexpected: {message}")]
    Unexpected { message: String },
}

impl RemoteError {
    /// Build a throttle error from a raw `Retry-After` header value in seconds.
    ///
    /// Anything that is not a finite, non-negative number leaves the delay
    /// unset.
    pub fn throttled_from_header(header: Option<&str>) -> Self {
        let retry_after = header
            .and_then(|value| value.trim().parse::<f64>().ok())
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok());
        RemoteError::Throttled { retry_after }
    }

    pub fn other(message: impl Into<String>) -> Self {
        RemoteError::Other {
            message: message.into(),
        }
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        RemoteError::Unexpected {
            message: message.into(),
        }
    }
}

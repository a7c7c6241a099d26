//! Classification of failed join attempts.

use std::time::Duration;

use invite_core::{Outcome, RemoteError};

/// What the worker should do with a job whose remote call failed.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Sleep for `delay`, then put the job back at the tail of the queue.
    Retry { delay: Duration },
    /// Report this outcome and drop the job.
    Fail(Outcome),
}

/// Decides between retrying and failing based on the remote error.
///
/// Only a throttle that names its own delay is retried. Everything else,
/// including a throttle without a usable `Retry-After`, fails the job.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryPolicy;

impl RetryPolicy {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, target_ref: &str, error: &RemoteError) -> RetryDecision {
        match error {
            RemoteError::NotFound => RetryDecision::Fail(Outcome::NotFound {
                target_ref: target_ref.to_string(),
            }),
            RemoteError::Forbidden => RetryDecision::Fail(Outcome::Forbidden {
                target_ref: target_ref.to_string(),
            }),
            RemoteError::Throttled {
                retry_after: Some(delay),
            } => RetryDecision::Retry { delay: *delay },
            RemoteError::Throttled { retry_after: None } => {
                RetryDecision::Fail(Outcome::PermanentFailure {
                    message: "rate limited without a retry-after delay".into(),
                })
            }
            RemoteError::Other { message } => RetryDecision::Fail(Outcome::PermanentFailure {
                message: message.clone(),
            }),
            RemoteError::Unexpected { .. } => RetryDecision::Fail(Outcome::PermanentFailure {
                message: error.to_string(),
            }),
        }
    }
}

//! Job domain types for queued join requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unique identifier for a job, using ULID for chronological sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Ulid);

impl JobId {
    /// Create a new unique job ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parse a job ID from a string.
    pub fn parse(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque handle identifying where replies for a job should go.
///
/// The command layer decides what this means (a channel, a user, a console
/// session); the worker only hands it back to the outcome reporter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReplyTarget(pub String);

impl ReplyTarget {
    pub fn new(target: impl Into<String>) -> Self {
        Self(target.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ReplyTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A request to join the server behind an invite reference.
///
/// Jobs are intentionally not `Clone`: at any moment a job is owned either
/// by the queue or by the worker processing it, and a throttled job is moved
/// back into the queue rather than copied.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier for this job.
    pub id: JobId,
    /// Who receives the outcome.
    pub requester: ReplyTarget,
    /// Invite code or link to join.
    pub target_ref: String,
    /// When the job was first queued.
    pub enqueued_at: DateTime<Utc>,
}

impl Job {
    /// Create a new job for the given requester and invite reference.
    pub fn new(requester: ReplyTarget, target_ref: impl Into<String>) -> Self {
        Self {
            id: JobId::new(),
            requester,
            target_ref: target_ref.into(),
            enqueued_at: Utc::now(),
        }
    }
}

/// Immediate acknowledgment returned when a join request is queued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgment {
    pub job_id: JobId,
    pub target_ref: String,
}

impl std::fmt::Display for Acknowledgment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Queued join request for {}", self.target_ref)
    }
}

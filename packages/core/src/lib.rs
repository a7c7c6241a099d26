//! Core domain types for the invite join queue.
//!
//! This crate contains shared types used across all packages:
//! - Job, JobId and ReplyTarget for queued join requests
//! - Outcome and RemoteError for the result of a join attempt
//! - WorkerConfig for limiter and shutdown settings
//! - Events for observing the worker

mod config;
mod events;
mod job;
mod outcome;

pub use config::{ConfigError, WorkerConfig};
pub use events::{JobEvent, WorkerState};
pub use job::{Acknowledgment, Job, JobId, ReplyTarget};
pub use outcome::{Outcome, RemoteError};

//! Rate-limited join worker.
//!
//! Join requests are queued, admitted through a sliding-window limiter and
//! executed one at a time against the chat platform.
//!
//! # Architecture
//!
//! - `JobQueue` - FIFO of pending jobs, owned by a `QueueActor`
//! - `RateLimiter` - at most N admissions in any trailing window
//! - `RetryPolicy` - retry on throttle with a server delay, fail otherwise
//! - `Worker` - the single consumer running the job state machine
//! - `ShutdownCoordinator` - cancels the worker on termination signals
//!
//! # Usage
//!
//! ```ignore
//! use invite_worker::JoinService;
//!
//! let service = JoinService::start(&config, client, reporter).await?;
//! let ack = service.request_join(ReplyTarget::new("general"), "rust-lang")?;
//! service.coordinator().listen_for_signals();
//! ```

mod client;
mod messages;
mod queue_actor;
mod rate_limiter;
mod retry;
mod service;
mod shutdown;
mod worker;

pub use client::{
    FnClient, FnReporter, JoinClient, JoinFuture, JoinResult, OutcomeReporter, ReportError,
    ReportFuture, ReportResult,
};
pub use messages::{QueueError, QueueMessage};
pub use queue_actor::{JobQueue, QueueActor};
pub use rate_limiter::RateLimiter;
pub use retry::{RetryDecision, RetryPolicy};
pub use service::{JoinService, ServiceError};
pub use shutdown::{ShutdownCoordinator, ShutdownReport, wait_for_signal};
pub use worker::{InFlight, Worker, WorkerExit};

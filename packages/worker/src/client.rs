//! Seams to the chat platform: the remote join call and outcome delivery.

use std::future::Future;
use std::pin::Pin;

use invite_core::{Outcome, RemoteError, ReplyTarget};

/// Result of a remote join: the joined server's name.
pub type JoinResult = Result<String, RemoteError>;

/// Future type for async join calls.
pub type JoinFuture = Pin<Box<dyn Future<Output = JoinResult> + Send>>;

/// Result type for outcome delivery.
pub type ReportResult = Result<(), ReportError>;

/// Future type for async outcome delivery.
pub type ReportFuture = Pin<Box<dyn Future<Output = ReportResult> + Send>>;

/// Resolves an invite and joins the server behind it.
///
/// Implementations own their own timeouts; the worker waits for whatever
/// the call returns.
pub trait JoinClient: Send + Sync + 'static {
    fn fetch_and_join(&self, target_ref: &str) -> JoinFuture;
}

/// Delivers outcomes back to whoever requested the join.
pub trait OutcomeReporter: Send + Sync + 'static {
    fn report(&self, target: &ReplyTarget, outcome: &Outcome) -> ReportFuture;
}

/// Failed to deliver an outcome.
#[derive(Debug, thiserror::Error)]
#[error("Failed to report to {target}: {message}")]
pub struct ReportError {
    pub target: ReplyTarget,
    pub message: String,
}

impl ReportError {
    pub fn new(target: &ReplyTarget, message: impl Into<String>) -> Self {
        Self {
            target: target.clone(),
            message: message.into(),
        }
    }
}

/// A simple function-based join client.
pub struct FnClient<F>
where
    F: Fn(&str) -> JoinFuture + Send + Sync + 'static,
{
    call: F,
}

impl<F> FnClient<F>
where
    F: Fn(&str) -> JoinFuture + Send + Sync + 'static,
{
    pub fn new(call: F) -> Self {
        Self { call }
    }
}

impl<F> JoinClient for FnClient<F>
where
    F: Fn(&str) -> JoinFuture + Send + Sync + 'static,
{
    fn fetch_and_join(&self, target_ref: &str) -> JoinFuture {
        (self.call)(target_ref)
    }
}

/// A simple function-based outcome reporter.
pub struct FnReporter<F>
where
    F: Fn(&ReplyTarget, &Outcome) -> ReportFuture + Send + Sync + 'static,
{
    report: F,
}

impl<F> FnReporter<F>
where
    F: Fn(&ReplyTarget, &Outcome) -> ReportFuture + Send + Sync + 'static,
{
    pub fn new(report: F) -> Self {
        Self { report }
    }
}

impl<F> OutcomeReporter for FnReporter<F>
where
    F: Fn(&ReplyTarget, &Outcome) -> ReportFuture + Send + Sync + 'static,
{
    fn report(&self, target: &ReplyTarget, outcome: &Outcome) -> ReportFuture {
        (self.report)(target, outcome)
    }
}

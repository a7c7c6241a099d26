#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use invite_core::{Outcome, RemoteError, ReplyTarget, WorkerConfig};
use invite_worker::{JoinClient, JoinFuture, JoinService, OutcomeReporter, ReportFuture};
use tokio::time::Instant;

/// One scripted response to a join call.
#[derive(Debug, Clone)]
pub enum Scripted {
    Join(String),
    Fail(RemoteError),
    Panic(String),
    /// Never completes; counts as cancelled when dropped.
    Hang,
    /// Blocks the runtime thread, ignoring cancellation, then joins.
    Block(Duration),
}

#[derive(Debug, Clone)]
pub struct CallRecord {
    pub target_ref: String,
    pub started: Instant,
    pub finished: Option<Instant>,
}

/// Join client answering from a per-invite script.
///
/// Invites without (remaining) script entries join a server named
/// `Server <ref>`.
#[derive(Default)]
pub struct ScriptedClient {
    script: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: Arc<Mutex<Vec<CallRecord>>>,
    cancelled: Arc<AtomicUsize>,
    latency: Duration,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn script(self, target_ref: &str, responses: Vec<Scripted>) -> Self {
        self.script
            .lock()
            .unwrap()
            .insert(target_ref.to_string(), responses.into());
        self
    }

    pub fn calls(&self) -> Vec<CallRecord> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_order(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.target_ref).collect()
    }

    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }
}

struct CancelGuard(Arc<AtomicUsize>);

impl Drop for CancelGuard {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

impl JoinClient for ScriptedClient {
    fn fetch_and_join(&self, target_ref: &str) -> JoinFuture {
        let response = self
            .script
            .lock()
            .unwrap()
            .get_mut(target_ref)
            .and_then(|responses| responses.pop_front())
            .unwrap_or_else(|| Scripted::Join(format!("Server {}", target_ref)));

        let index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(CallRecord {
                target_ref: target_ref.to_string(),
                started: Instant::now(),
                finished: None,
            });
            calls.len() - 1
        };

        let calls = Arc::clone(&self.calls);
        let cancelled = Arc::clone(&self.cancelled);
        let latency = self.latency;

        Box::pin(async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            let result = match response {
                Scripted::Join(name) => Ok(name),
                Scripted::Fail(error) => Err(error),
                Scripted::Panic(message) => panic!("{}", message),
                Scripted::Hang => {
                    let _guard = CancelGuard(cancelled);
                    std::future::pending().await
                }
                Scripted::Block(duration) => {
                    std::thread::sleep(duration);
                    Ok("Blocked Server".to_string())
                }
            };
            calls.lock().unwrap()[index].finished = Some(Instant::now());
            result
        })
    }
}

/// Reporter that records every outcome it is given.
#[derive(Default)]
pub struct RecordingReporter {
    reports: Mutex<Vec<(ReplyTarget, Outcome)>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<(ReplyTarget, Outcome)> {
        self.reports.lock().unwrap().clone()
    }

    pub fn outcomes_for(&self, target: &str) -> Vec<Outcome> {
        self.reports()
            .into_iter()
            .filter(|(t, _)| t.as_str() == target)
            .map(|(_, o)| o)
            .collect()
    }

    pub fn terminal_count(&self) -> usize {
        self.reports()
            .iter()
            .filter(|(_, o)| o.is_terminal())
            .count()
    }
}

impl OutcomeReporter for RecordingReporter {
    fn report(&self, target: &ReplyTarget, outcome: &Outcome) -> ReportFuture {
        self.reports
            .lock()
            .unwrap()
            .push((target.clone(), outcome.clone()));
        Box::pin(async { Ok(()) })
    }
}

pub async fn start(
    client: &Arc<ScriptedClient>,
    reporter: &Arc<RecordingReporter>,
) -> JoinService {
    start_with(WorkerConfig::default(), client, reporter).await
}

pub async fn start_with(
    config: WorkerConfig,
    client: &Arc<ScriptedClient>,
    reporter: &Arc<RecordingReporter>,
) -> JoinService {
    JoinService::start(
        &config,
        Arc::clone(client) as Arc<dyn JoinClient>,
        Arc::clone(reporter) as Arc<dyn OutcomeReporter>,
    )
    .await
    .expect("service starts")
}

/// Poll `condition` until it holds, panicking after `limit` of (virtual) time.
pub async fn eventually<F>(limit: Duration, mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + limit;
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met within {:?}", limit);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

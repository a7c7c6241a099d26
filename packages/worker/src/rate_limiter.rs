//! Sliding-window admission limiter.

use std::collections::VecDeque;
use std::time::Duration;

use invite_core::WorkerConfig;
use tokio::time::Instant;

/// Allows at most `capacity` admissions in any trailing `window`.
///
/// This is a strict count over the last `window`, not a token bucket: after
/// a burst of `capacity` admissions the next one waits until the oldest of
/// them ages out.
///
/// `admit` takes `&mut self`: the limiter is owned by the single worker. To
/// share it between several consumers, wrap it in a `tokio::sync::Mutex`
/// and hold the guard across `admit`.
#[derive(Debug)]
pub struct RateLimiter {
    capacity: usize,
    window: Duration,
    /// Admission instants, oldest first. Never longer than `capacity`.
    admissions: VecDeque<Instant>,
}

impl RateLimiter {
    pub fn new(capacity: usize, window: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            window,
            admissions: VecDeque::with_capacity(capacity),
        }
    }

    pub fn from_config(config: &WorkerConfig) -> Self {
        Self::new(config.rate_limit_count, config.rate_limit_window())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Admissions still inside the window as of `now`.
    pub fn in_window(&mut self, now: Instant) -> usize {
        self.prune(now);
        self.admissions.len()
    }

    /// How long a caller arriving at `now` would have to wait.
    pub fn wait_time(&mut self, now: Instant) -> Duration {
        self.prune(now);
        if self.admissions.len() < self.capacity {
            return Duration::ZERO;
        }
        match self.admissions.front() {
            Some(oldest) => self.window.saturating_sub(now.saturating_duration_since(*oldest)),
            None => Duration::ZERO,
        }
    }

    /// Wait until an admission is allowed, then record it.
    ///
    /// Returns how long the caller was held back. Cancelling the returned
    /// future before it completes records nothing.
    pub async fn admit(&mut self) -> Duration {
        let started = Instant::now();
        loop {
            let wait = self.wait_time(Instant::now());
            if wait.is_zero() {
                break;
            }
            tracing::info!(
                "Rate limit reached, waiting for {:.2} seconds...",
                wait.as_secs_f64()
            );
            tokio::time::sleep(wait).await;
        }
        self.admissions.push_back(Instant::now());
        started.elapsed()
    }

    fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.admissions.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                self.admissions.pop_front();
            } else {
                break;
            }
        }
    }
}

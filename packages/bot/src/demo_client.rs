//! Demo join client that fakes the chat platform.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use invite_core::RemoteError;
use invite_worker::{JoinClient, JoinFuture};

const INVITE_PREFIXES: [&str; 3] = ["https://discord.gg/", "discord.gg/", "https://discord.com/invite/"];

/// Classifies invites by prefix:
///
/// - `missing-*` not found
/// - `private-*` forbidden
/// - `slow-*` throttled for 2s on the first attempt, then joins
/// - `broken-*` fails with a server error
///
/// Anything else joins a server named after the invite code.
#[derive(Default)]
pub struct DemoClient {
    throttled: Mutex<HashSet<String>>,
}

impl DemoClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn first_throttle(&self, code: &str) -> bool {
        self.throttled
            .lock()
            .map(|mut seen| seen.insert(code.to_string()))
            .unwrap_or(false)
    }
}

pub fn invite_code(target_ref: &str) -> &str {
    INVITE_PREFIXES
        .iter()
        .find_map(|prefix| target_ref.strip_prefix(prefix))
        .unwrap_or(target_ref)
        .trim_end_matches('/')
}

impl JoinClient for DemoClient {
    fn fetch_and_join(&self, target_ref: &str) -> JoinFuture {
        let code = invite_code(target_ref).to_string();
        let result = if code.starts_with("missing-") {
            Err(RemoteError::NotFound)
        } else if code.starts_with("private-") {
            Err(RemoteError::Forbidden)
        } else if code.starts_with("slow-") && self.first_throttle(&code) {
            Err(RemoteError::throttled_from_header(Some("2.0")))
        } else if code.starts_with("broken-") {
            Err(RemoteError::other("500 Internal Server Error"))
        } else {
            Ok(format!("Server {}", code))
        };

        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            result
        })
    }
}

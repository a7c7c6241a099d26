//! Console join bot.
//!
//! Reads `!join <invite>` commands from stdin and feeds them to the
//! rate-limited join worker. Stops on SIGINT or SIGTERM.

use std::sync::Arc;

use invite_core::{ReplyTarget, WorkerConfig};
use invite_worker::JoinService;
use tracing_subscriber::EnvFilter;

mod console;
mod demo_client;

use console::ConsoleReporter;
use demo_client::DemoClient;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => WorkerConfig::from_json_file(path)?,
        None => WorkerConfig::default(),
    }
    .with_env_overrides()?;

    let service = JoinService::start(&config, Arc::new(DemoClient::new()), Arc::new(ConsoleReporter))
        .await?;
    let coordinator = service.coordinator();
    let signals = coordinator.listen_for_signals();

    tracing::info!("Join bot is now running!");
    let requester = ReplyTarget::new("console");

    tokio::select! {
        result = console::run(&service, &requester, console::spawn_stdin_reader()) => {
            if let Err(e) = result {
                tracing::error!("Console input failed: {}", e);
            }
            tracing::info!("Console input closed; waiting for a termination signal");
            coordinator.stopped().await;
        }
        _ = coordinator.stopped() => {}
    }

    if let Err(e) = signals.await {
        tracing::warn!("Signal listener ended abnormally: {}", e);
    }
    Ok(())
}

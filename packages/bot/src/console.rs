//! Console front-end: reads `!join <invite>` commands from stdin.

use invite_core::{Outcome, ReplyTarget};
use invite_worker::{JoinService, OutcomeReporter, ReportFuture};
use tokio::sync::mpsc;

pub const PREFIX: char = '!';

/// A parsed console command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Join(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("invite_link is a required argument that is missing.")]
    MissingInvite,

    #[error("Command \"{0}\" is not found")]
    Unknown(String),
}

impl Command {
    /// Parse one input line. Lines without the command prefix are not commands.
    pub fn parse(line: &str) -> Option<Result<Command, CommandError>> {
        let rest = line.trim().strip_prefix(PREFIX)?;
        let mut parts = rest.split_whitespace();
        let name = parts.next()?;

        Some(match name {
            "join" => match parts.next() {
                Some(invite) => Ok(Command::Join(invite.to_string())),
                None => Err(CommandError::MissingInvite),
            },
            other => Err(CommandError::Unknown(other.to_string())),
        })
    }
}

fn reply(target: &ReplyTarget, message: &str) {
    println!("[{}] {}", target, message);
}

/// Prints outcomes to stdout, tagged with the requester.
pub struct ConsoleReporter;

impl OutcomeReporter for ConsoleReporter {
    fn report(&self, target: &ReplyTarget, outcome: &Outcome) -> ReportFuture {
        reply(target, &outcome.to_string());
        Box::pin(async { Ok(()) })
    }
}

/// Forward stdin lines from a plain thread.
///
/// A blocking stdin read on the runtime's blocking pool would keep the
/// runtime from shutting down, so the reader lives outside it.
pub fn spawn_stdin_reader() -> mpsc::Receiver<std::io::Result<String>> {
    let (tx, rx) = mpsc::channel(64);
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let failed = line.is_err();
            if tx.blocking_send(line).is_err() || failed {
                break;
            }
        }
    });
    rx
}

/// Handle commands until the input ends.
pub async fn run(
    service: &JoinService,
    requester: &ReplyTarget,
    mut lines: mpsc::Receiver<std::io::Result<String>>,
) -> std::io::Result<()> {
    while let Some(line) = lines.recv().await {
        let line = line?;
        match Command::parse(&line) {
            Some(Ok(Command::Join(invite))) => {
                match service.request_join(requester.clone(), invite) {
                    Ok(ack) => reply(requester, &ack.to_string()),
                    Err(e) => {
                        tracing::error!("Command error: {}", e);
                        reply(requester, &format!("An error occurred: {}", e));
                    }
                }
            }
            Some(Err(e)) => {
                tracing::warn!("Command error: {}", e);
                reply(requester, &format!("An error occurred: {}", e));
            }
            None => {}
        }
    }

    Ok(())
}

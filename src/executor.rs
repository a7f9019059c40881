//! Launches lifecycle commands and streams their output.
//!
//! One external process per accepted command. Admission goes through the
//! reconciler so the one-command-per-service invariant is enforced in a
//! single place; the executor's job is to run the process, forward its
//! output incrementally, reap it, and report the outcome.

use crate::docker::ComposeClient;
use crate::error::{Error, Result};
use crate::poller::Poller;
use crate::registry::{CommandKind, Outcome, ReconcilerHandle, ServiceKey};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Child;
use tokio::sync::mpsc;

/// How many trailing stderr lines to keep for the failure diagnostic.
const STDERR_TAIL_LINES: usize = 20;

/// Incremental output of one in-flight command.
///
/// Lines arrive as the process emits them; the stream ends when the process
/// exits and its output is drained. A finished command's output is gone —
/// streams are not replayable.
pub struct CommandStream {
    pub key: ServiceKey,
    pub kind: CommandKind,
    lines: mpsc::UnboundedReceiver<String>,
}

impl CommandStream {
    /// Next output line, or `None` once the command has finished and all
    /// output has been consumed.
    pub async fn next_line(&mut self) -> Option<String> {
        self.lines.recv().await
    }

    /// Non-blocking variant for tick-driven consumers.
    pub fn try_next_line(&mut self) -> Option<String> {
        self.lines.try_recv().ok()
    }

    /// Drain everything currently buffered into `out`. Returns `false` once
    /// the command has finished and its output is exhausted.
    pub fn drain_into(&mut self, out: &mut Vec<String>) -> bool {
        loop {
            match self.lines.try_recv() {
                Ok(line) => out.push(line),
                Err(mpsc::error::TryRecvError::Empty) => return true,
                Err(mpsc::error::TryRecvError::Disconnected) => return false,
            }
        }
    }
}

/// Runs lifecycle commands against the orchestration tool.
#[derive(Clone)]
pub struct Executor {
    client: ComposeClient,
    reconciler: ReconcilerHandle,
    poller: Poller,
}

impl Executor {
    pub fn new(client: ComposeClient, reconciler: ReconcilerHandle, poller: Poller) -> Self {
        Self {
            client,
            reconciler,
            poller,
        }
    }

    /// Execute one lifecycle command for one service.
    ///
    /// Fails with [`Error::CommandAlreadyInProgress`] before any process is
    /// launched if the service already has a command in flight. On
    /// acceptance the process runs to completion in a background task which
    /// reports `command_finished` to the reconciler; the returned stream
    /// yields its output lines as they arrive.
    pub async fn execute(&self, key: ServiceKey, kind: CommandKind) -> Result<CommandStream> {
        self.reconciler.begin_command(key.clone(), kind).await?;

        let child = match self.client.spawn_lifecycle(&key.project, &key.service, kind) {
            Ok(child) => child,
            Err(e) => {
                // Admission already happened; report the failure so the
                // in-flight marker is cleared.
                let err: Error = e.into();
                self.reconciler.command_finished(
                    key,
                    Outcome::Failed {
                        exit_code: None,
                        detail: err.to_string(),
                    },
                );
                return Err(err);
            }
        };

        tracing::info!("Executing {} on {}", kind, key);

        let (line_tx, line_rx) = mpsc::unbounded_channel();
        let reconciler = self.reconciler.clone();
        let poller = self.poller.clone();
        let task_key = key.clone();
        tokio::spawn(async move {
            let outcome = drive_command(child, task_key.clone(), kind, reconciler, line_tx).await;
            // Confirm success with a poll. A failure must keep its error
            // status on screen, so the confirming poll is skipped for it.
            if outcome == Outcome::Success {
                poller.poll(task_key.project).await;
            }
        });

        Ok(CommandStream {
            key,
            kind,
            lines: line_rx,
        })
    }
}

/// Run the child to completion: forward output, reap, report the outcome
/// to the reconciler and return it.
async fn drive_command(
    mut child: Child,
    key: ServiceKey,
    kind: CommandKind,
    reconciler: ReconcilerHandle,
    line_tx: mpsc::UnboundedSender<String>,
) -> Outcome {
    let stderr_tail = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));
    let mut readers = Vec::new();

    if let Some(stdout) = child.stdout.take() {
        let tx = line_tx.clone();
        readers.push(tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let _ = tx.send(line);
            }
        }));
    }

    if let Some(stderr) = child.stderr.take() {
        let tx = line_tx.clone();
        let tail = stderr_tail.clone();
        readers.push(tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                {
                    let mut tail = tail.lock();
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line.clone());
                }
                let _ = tx.send(format!("[stderr] {}", line));
            }
        }));
    }

    let status = child.wait().await;

    // Readers run to EOF so the pipes are fully drained before the outcome
    // is reported.
    for reader in readers {
        let _ = reader.await;
    }

    let outcome = match status {
        Ok(status) if status.success() => Outcome::Success,
        Ok(status) => {
            let detail = {
                let tail = stderr_tail.lock();
                tail.iter().cloned().collect::<Vec<_>>().join("\n")
            };
            Outcome::Failed {
                exit_code: status.code(),
                detail,
            }
        }
        Err(e) => Outcome::Failed {
            exit_code: None,
            detail: format!("failed to wait for {}: {}", kind, e),
        },
    };

    match &outcome {
        Outcome::Success => tracing::info!("{} on {} succeeded", kind, key),
        Outcome::Failed { exit_code, .. } => {
            tracing::warn!("{} on {} failed (exit {:?})", kind, key, exit_code)
        }
        Outcome::Cancelled => tracing::info!("{} on {} cancelled", kind, key),
    }

    reconciler.command_finished(key, outcome.clone());
    outcome
}

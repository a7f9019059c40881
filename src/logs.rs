//! Long-lived, cancellable log tailing.
//!
//! Each stream owns one external `logs --follow` process. Cancellation is
//! the hard requirement here: when the view consuming a stream closes, the
//! process must die — SIGTERM first, SIGKILL after a bounded grace period —
//! and always be reaped. Dropping the handle without an explicit cancel
//! falls back to kill-on-drop so nothing can leak.

use crate::docker::ComposeClient;
use crate::error::Result;
use crate::registry::ServiceKey;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Lines of history to seed a fresh tail with.
const LOG_TAIL_LINES: usize = 200;

/// How long a cancelled log process gets to exit after SIGTERM before it is
/// killed outright.
const TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// Opens log streams.
#[derive(Clone)]
pub struct LogStreamer {
    client: ComposeClient,
}

impl LogStreamer {
    pub fn new(client: ComposeClient) -> Self {
        Self { client }
    }

    /// Open a fresh tail for one service.
    ///
    /// Not a resume: closing and reopening starts over from the recent
    /// history. Lines within the stream are in emission order; streams for
    /// different services are fully independent.
    pub fn stream(&self, key: ServiceKey) -> Result<LogStream> {
        let child = self
            .client
            .spawn_logs(&key.project, &key.service, LOG_TAIL_LINES)?;

        tracing::info!("Streaming logs for {}", key);

        let (line_tx, line_rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        let task_token = token.clone();
        let task_key = key.clone();
        let task = tokio::spawn(async move {
            drive_stream(child, task_key, task_token, line_tx).await;
        });

        Ok(LogStream {
            key,
            lines: line_rx,
            token,
            task: Some(task),
        })
    }
}

/// One live log tail. Lines arrive in emission order; the stream ends when
/// the process exits or the stream is cancelled.
pub struct LogStream {
    pub key: ServiceKey,
    lines: mpsc::UnboundedReceiver<String>,
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl LogStream {
    /// Next log line, or `None` when the stream has ended.
    pub async fn next_line(&mut self) -> Option<String> {
        self.lines.recv().await
    }

    /// Non-blocking variant for tick-driven consumers.
    pub fn try_next_line(&mut self) -> Option<String> {
        self.lines.try_recv().ok()
    }

    /// Drain everything currently buffered into `out`. Returns `false` once
    /// the stream has ended and its output is exhausted.
    pub fn drain_into(&mut self, out: &mut Vec<String>) -> bool {
        loop {
            match self.lines.try_recv() {
                Ok(line) => out.push(line),
                Err(mpsc::error::TryRecvError::Empty) => return true,
                Err(mpsc::error::TryRecvError::Disconnected) => return false,
            }
        }
    }

    /// Request termination without waiting for it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Cancel and wait until the external process has been terminated and
    /// reaped.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for LogStream {
    fn drop(&mut self) {
        // Cancelling is enough: the driver task owns the child and runs the
        // terminate path to completion even after the handle is gone.
        self.token.cancel();
    }
}

async fn drive_stream(
    mut child: Child,
    key: ServiceKey,
    token: CancellationToken,
    line_tx: mpsc::UnboundedSender<String>,
) {
    let mut readers = Vec::new();

    if let Some(stdout) = child.stdout.take() {
        let tx = line_tx.clone();
        readers.push(tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tx.send(line).is_err() {
                    break;
                }
            }
        }));
    }

    if let Some(stderr) = child.stderr.take() {
        let tx = line_tx.clone();
        readers.push(tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tx.send(line).is_err() {
                    break;
                }
            }
        }));
    }

    tokio::select! {
        _ = token.cancelled() => {
            tracing::debug!("Log stream for {} cancelled, terminating tail", key);
            terminate(&mut child).await;
        }
        status = child.wait() => {
            tracing::debug!("Log tail for {} ended on its own: {:?}", key, status);
        }
    }

    for reader in readers {
        reader.abort();
        let _ = reader.await;
    }
}

/// Terminate the child: SIGTERM, bounded grace, SIGKILL escalation. Always
/// reaps, on every path.
async fn terminate(child: &mut Child) {
    let Some(pid) = child.id() else {
        // Already exited; just reap.
        let _ = child.wait().await;
        return;
    };

    let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);

    match tokio::time::timeout(TERMINATE_GRACE, child.wait()).await {
        Ok(_) => {}
        Err(_) => {
            tracing::warn!("Log tail (pid {}) ignored SIGTERM, killing", pid);
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
    }
}

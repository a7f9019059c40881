//! Periodic and on-demand status polling.

use crate::docker::ComposeClient;
use crate::registry::{RawStatus, ReconcilerHandle};
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Queries the orchestration tool for live service status, one batched
/// invocation per project, and feeds results to the reconciler.
#[derive(Clone)]
pub struct Poller {
    client: ComposeClient,
    reconciler: ReconcilerHandle,
}

impl Poller {
    pub fn new(client: ComposeClient, reconciler: ReconcilerHandle) -> Self {
        Self { client, reconciler }
    }

    /// Poll one project once. A failed query is reported as a poll error;
    /// previously known statuses are retained by the reconciler.
    pub async fn poll(&self, project: PathBuf) {
        let result = match self.client.ps(&project).await {
            Ok(entries) => Ok(entries
                .into_iter()
                .map(|entry| RawStatus {
                    service: entry.service,
                    state: entry.state,
                    container_id: entry.container_id,
                })
                .collect()),
            Err(e) => Err(e.to_string()),
        };
        self.reconciler.poll_result(project, result);
    }

    /// Poll every project whose service list is known, concurrently.
    pub async fn poll_all(&self) {
        let targets = self.reconciler.snapshot().poll_targets();
        futures::future::join_all(targets.into_iter().map(|target| self.poll(target))).await;
    }

    /// Spawn the fixed-interval refresh loop.
    pub fn spawn_interval(&self, interval: Duration) -> JoinHandle<()> {
        let poller = self.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The immediate first tick is skipped; discovery triggers the
            // initial poll itself.
            tick.tick().await;
            loop {
                tick.tick().await;
                poller.poll_all().await;
            }
        })
    }
}

//! The UI-facing core: wires discovery, polling, command execution and log
//! streaming around the reconciler and exposes non-blocking entry points.

use crate::compose::Discoverer;
use crate::docker::ComposeClient;
use crate::error::Result;
use crate::executor::{CommandStream, Executor};
use crate::logs::{LogStream, LogStreamer};
use crate::poller::Poller;
use crate::registry::{
    CommandKind, ParseError, Reconciler, ReconcilerHandle, ServiceKey, Snapshot,
};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Default fixed refresh interval for the status poller.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(10);

/// The service-state engine behind the dashboard.
///
/// Construction spawns the reconciler, the periodic poller, and the initial
/// discovery pass. All entry points return immediately; results arrive
/// through the snapshot channel.
pub struct Dashboard {
    root: PathBuf,
    denylist: Vec<String>,
    reconciler: ReconcilerHandle,
    executor: Executor,
    poller: Poller,
    streamer: LogStreamer,
    poll_task: JoinHandle<()>,
}

impl Dashboard {
    /// Build the engine over a root directory and start its background
    /// tasks: reconciler, interval poller, initial discovery.
    pub fn new(client: ComposeClient, root: PathBuf, refresh_interval: Duration) -> Self {
        Self::with_denylist(
            client,
            root,
            crate::compose::DEFAULT_DENYLIST
                .iter()
                .map(|s| s.to_string())
                .collect(),
            refresh_interval,
        )
    }

    pub fn with_denylist(
        client: ComposeClient,
        root: PathBuf,
        denylist: Vec<String>,
        refresh_interval: Duration,
    ) -> Self {
        let reconciler = Reconciler::spawn();
        let poller = Poller::new(client.clone(), reconciler.clone());
        let executor = Executor::new(client.clone(), reconciler.clone(), poller.clone());
        let streamer = LogStreamer::new(client);
        let poll_task = poller.spawn_interval(refresh_interval);

        let dashboard = Self {
            root,
            denylist,
            reconciler,
            executor,
            poller,
            streamer,
            poll_task,
        };
        dashboard.rediscover();
        dashboard
    }

    /// Current consistent snapshot of the full registry.
    pub fn snapshot(&self) -> Snapshot {
        self.reconciler.snapshot()
    }

    /// Subscribe to snapshot updates (one per applied event).
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.reconciler.subscribe()
    }

    /// All accumulated definition parse errors.
    pub fn parse_errors(&self) -> Vec<ParseError> {
        self.snapshot().parse_errors()
    }

    /// Issue a lifecycle command against one service.
    ///
    /// Rejected with `CommandAlreadyInProgress` if the service already has
    /// one in flight; on acceptance the returned stream carries the
    /// command's output and the registry reflects progress asynchronously.
    pub async fn request_command(
        &self,
        key: ServiceKey,
        kind: CommandKind,
    ) -> Result<CommandStream> {
        self.executor.execute(key, kind).await
    }

    /// Re-poll one project, or every project, in the background.
    pub fn request_refresh(&self, project: Option<PathBuf>) {
        let poller = self.poller.clone();
        tokio::spawn(async move {
            match project {
                Some(project) => poller.poll(project).await,
                None => poller.poll_all().await,
            }
        });
    }

    /// Open a log stream for one service.
    pub fn request_log_stream(&self, key: ServiceKey) -> Result<LogStream> {
        self.streamer.stream(key)
    }

    /// Re-walk the tree and replace the entire project set, then poll the
    /// fresh set. Runs in the background; the snapshot updates when done.
    pub fn rediscover(&self) {
        let discoverer = Discoverer::with_denylist(self.root.clone(), self.denylist.clone());
        let reconciler = self.reconciler.clone();
        let poller = self.poller.clone();
        tokio::spawn(async move {
            let projects = tokio::task::spawn_blocking(move || discoverer.discover())
                .await
                .unwrap_or_default();
            reconciler.discovered(projects);
            poller.poll_all().await;
        });
    }

    /// Root directory this dashboard was opened over.
    pub fn root(&self) -> &PathBuf {
        &self.root
    }
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        self.poll_task.abort();
    }
}

//! The single writer over the registry.
//!
//! Every mutation arrives as an [`Event`] on one channel and is applied by
//! one task that owns the [`Registry`]. After each fully-applied event the
//! task publishes a fresh [`Snapshot`] through a `watch` channel, so readers
//! never observe a torn state and never block the writer beyond one clone.

use super::{CommandKind, Outcome, Project, RawStatus, Registry, ServiceKey, Snapshot};
use crate::error::{Error, Result};
use std::path::PathBuf;
use tokio::sync::{mpsc, oneshot, watch};

/// The four event kinds that may mutate the registry.
#[derive(Debug)]
pub enum Event {
    /// Discovery finished: replace the whole project set.
    Discovered(Vec<Project>),
    /// One batched status query completed (or failed) for one project.
    PollResult {
        project: PathBuf,
        result: std::result::Result<Vec<RawStatus>, String>,
    },
    /// A lifecycle command wants to start. Accept/reject is decided here so
    /// the one-command-per-service invariant is checked and set atomically.
    CommandStarted {
        key: ServiceKey,
        kind: CommandKind,
        reply: oneshot::Sender<Result<()>>,
    },
    /// A lifecycle command reached its terminal outcome.
    CommandFinished { key: ServiceKey, outcome: Outcome },
}

/// Spawns and owns the reconciler task.
pub struct Reconciler;

impl Reconciler {
    /// Spawn the reconciler loop. The task ends when every handle is dropped.
    pub fn spawn() -> ReconcilerHandle {
        let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
        let (snapshot_tx, snapshot_rx) = watch::channel(Snapshot::empty());

        tokio::spawn(async move {
            let mut registry = Registry::new();
            while let Some(event) = rx.recv().await {
                match event {
                    Event::Discovered(projects) => {
                        tracing::info!("Discovered {} project(s)", projects.len());
                        registry.apply_discovered(projects);
                    }
                    Event::PollResult { project, result } => {
                        registry.apply_poll(&project, result);
                    }
                    Event::CommandStarted { key, kind, reply } => {
                        let accepted = registry.begin_command(&key, kind);
                        // Receiver gone means the requester gave up; the
                        // registry change below still stands if accepted,
                        // so only accept when we can tell the caller.
                        if reply.is_closed() {
                            if accepted.is_ok() {
                                registry.finish_command(&key, &Outcome::Cancelled);
                            }
                        } else {
                            let _ = reply.send(accepted);
                        }
                    }
                    Event::CommandFinished { key, outcome } => {
                        registry.finish_command(&key, &outcome);
                    }
                }
                let _ = snapshot_tx.send(registry.snapshot());
            }
            tracing::debug!("Reconciler loop ended");
        });

        ReconcilerHandle { tx, snapshot_rx }
    }
}

/// Cloneable handle for producing events and reading snapshots.
#[derive(Debug, Clone)]
pub struct ReconcilerHandle {
    tx: mpsc::UnboundedSender<Event>,
    snapshot_rx: watch::Receiver<Snapshot>,
}

impl ReconcilerHandle {
    /// Replace the project set with a fresh discovery result.
    pub fn discovered(&self, projects: Vec<Project>) {
        let _ = self.tx.send(Event::Discovered(projects));
    }

    /// Report one poll result for one project.
    pub fn poll_result(
        &self,
        project: PathBuf,
        result: std::result::Result<Vec<RawStatus>, String>,
    ) {
        let _ = self.tx.send(Event::PollResult { project, result });
    }

    /// Ask the reconciler to admit a lifecycle command for a service.
    ///
    /// Returns `Err(CommandAlreadyInProgress)` without any state change if a
    /// command is already running against the same service.
    pub async fn begin_command(&self, key: ServiceKey, kind: CommandKind) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(Event::CommandStarted { key, kind, reply })
            .map_err(|_| Error::RegistryClosed)?;
        response.await.map_err(|_| Error::RegistryClosed)?
    }

    /// Report a command's terminal outcome.
    pub fn command_finished(&self, key: ServiceKey, outcome: Outcome) {
        let _ = self.tx.send(Event::CommandFinished { key, outcome });
    }

    /// Current snapshot (cheap clone of the latest published value).
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Subscribe to snapshot updates; the receiver yields after every
    /// applied event.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshot_rx.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Status;

    fn project(name: &str, services: &[&str]) -> Project {
        Project::new(
            PathBuf::from(format!("/tmp/{}/docker-compose.yml", name)),
            services.iter().map(|s| s.to_string()).collect(),
            Vec::new(),
        )
    }

    async fn wait_for<F: Fn(&Snapshot) -> bool>(
        rx: &mut watch::Receiver<Snapshot>,
        pred: F,
    ) -> Snapshot {
        loop {
            {
                let snap = rx.borrow();
                if pred(&snap) {
                    return snap.clone();
                }
            }
            rx.changed().await.expect("reconciler gone");
        }
    }

    #[tokio::test]
    async fn events_apply_in_order_and_publish_snapshots() {
        let handle = Reconciler::spawn();
        let mut rx = handle.subscribe();

        let p = project("api", &["web"]);
        let path = p.path.clone();
        handle.discovered(vec![p]);
        wait_for(&mut rx, |s| !s.projects.is_empty()).await;

        handle.poll_result(
            path.clone(),
            Ok(vec![RawStatus {
                service: "web".to_string(),
                state: "running".to_string(),
                container_id: Some("abc".to_string()),
            }]),
        );

        let key = ServiceKey::new(&path, "web");
        let snap = wait_for(&mut rx, |s| {
            s.service(&ServiceKey::new("/tmp/api", "web"))
                .map(|row| row.status == Status::Running)
                .unwrap_or(false)
        })
        .await;
        assert_eq!(
            snap.service(&key).unwrap().container_id.as_deref(),
            Some("abc")
        );
    }

    #[tokio::test]
    async fn duplicate_command_rejected_through_the_ask() {
        let handle = Reconciler::spawn();
        let p = project("api", &["web"]);
        let key = ServiceKey::new(&p.path, "web");
        handle.discovered(vec![p]);

        handle
            .begin_command(key.clone(), CommandKind::Start)
            .await
            .expect("first command admitted");

        let err = handle
            .begin_command(key.clone(), CommandKind::Restart)
            .await
            .expect_err("second command must be rejected");
        assert!(matches!(err, Error::CommandAlreadyInProgress { .. }));

        handle.command_finished(key.clone(), Outcome::Success);

        // After completion a new command is admitted again.
        handle
            .begin_command(key, CommandKind::Stop)
            .await
            .expect("command admitted after completion");
    }

    #[tokio::test]
    async fn unknown_service_command_is_rejected() {
        let handle = Reconciler::spawn();
        handle.discovered(vec![project("api", &["web"])]);

        let err = handle
            .begin_command(ServiceKey::new("/tmp/api", "ghost"), CommandKind::Start)
            .await
            .expect_err("unknown service");
        assert!(matches!(err, Error::ServiceNotFound(_)));
    }
}

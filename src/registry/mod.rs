//! Registry data model: projects, services, statuses.
//!
//! The registry is the single source of truth for everything the dashboard
//! renders. It is only ever mutated by the [`reconciler`] actor; everyone
//! else reads immutable [`Snapshot`]s.

pub mod reconciler;

pub use reconciler::{Event, Reconciler, ReconcilerHandle};

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Current status of a service as known to the dashboard.
///
/// `Loading` and `Building` are command-driven transient states; the rest
/// come from the orchestration tool's raw state strings via
/// [`Status::from_raw`], which is total: anything unrecognized maps to
/// `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// No information yet (pre-first-poll).
    Unknown,
    /// A start/stop/restart command is in flight.
    Loading,
    /// Container is running.
    Running,
    /// Container is stopped or was never created.
    Stopped,
    /// A build command is in flight.
    Building,
    /// The last command or the container itself failed.
    Error,
    /// Any raw state with no dedicated mapping (paused, removing, ...).
    Other,
}

impl Status {
    /// Map a raw orchestration-tool state string to a status.
    ///
    /// The table covers the states `docker inspect -f '{{.State.Status}}'`
    /// and `docker compose ps` can report; it is total by construction.
    pub fn from_raw(raw: &str) -> Status {
        match raw.trim().to_ascii_lowercase().as_str() {
            "running" => Status::Running,
            "exited" | "created" | "stopped" => Status::Stopped,
            "restarting" => Status::Loading,
            "dead" => Status::Error,
            "" => Status::Unknown,
            _ => Status::Other,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Unknown => write!(f, "unknown"),
            Status::Loading => write!(f, "loading"),
            Status::Running => write!(f, "running"),
            Status::Stopped => write!(f, "stopped"),
            Status::Building => write!(f, "building"),
            Status::Error => write!(f, "error"),
            Status::Other => write!(f, "other"),
        }
    }
}

/// Kind of lifecycle command issued against a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Start,
    Stop,
    Restart,
    Build,
}

impl CommandKind {
    /// The transient status a service shows while this command runs.
    pub fn transient_status(&self) -> Status {
        match self {
            CommandKind::Build => Status::Building,
            _ => Status::Loading,
        }
    }

    /// The provisional status applied when this command succeeds, until the
    /// next poll confirms. `None` means revert to the pre-command status.
    pub fn success_status(&self) -> Option<Status> {
        match self {
            CommandKind::Start | CommandKind::Restart => Some(Status::Running),
            CommandKind::Stop => Some(Status::Stopped),
            CommandKind::Build => None,
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandKind::Start => write!(f, "start"),
            CommandKind::Stop => write!(f, "stop"),
            CommandKind::Restart => write!(f, "restart"),
            CommandKind::Build => write!(f, "build"),
        }
    }
}

/// Terminal outcome of one lifecycle command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failed {
        exit_code: Option<i32>,
        detail: String,
    },
    Cancelled,
}

/// A definition file that could not be read or parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub path: PathBuf,
    pub message: String,
}

/// One discovered compose project: a definition file and its declared
/// services. Identity is the containing directory; it never changes after
/// discovery.
#[derive(Debug, Clone)]
pub struct Project {
    /// Directory containing the definition file. Identity.
    pub path: PathBuf,
    /// The definition file itself.
    pub file: PathBuf,
    /// Display name: the directory name.
    pub name: String,
    /// Declared service names, in document order, deduplicated.
    pub services: Vec<String>,
    /// Parse failures attached to this project.
    pub errors: Vec<ParseError>,
}

impl Project {
    pub fn new(file: PathBuf, services: Vec<String>, errors: Vec<ParseError>) -> Self {
        let path = file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            path,
            file,
            name,
            services,
            errors,
        }
    }
}

/// Unique identity of a service across the whole registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceKey {
    /// Owning project's directory.
    pub project: PathBuf,
    /// Service name within the project.
    pub service: String,
}

impl ServiceKey {
    pub fn new(project: impl Into<PathBuf>, service: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            service: service.into(),
        }
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let project = self
            .project
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| self.project.to_string_lossy());
        write!(f, "{}/{}", project, self.service)
    }
}

/// Raw per-service status as reported by one batched query.
#[derive(Debug, Clone)]
pub struct RawStatus {
    pub service: String,
    pub state: String,
    pub container_id: Option<String>,
}

/// A command currently running against a service.
#[derive(Debug, Clone, Copy)]
struct InFlight {
    kind: CommandKind,
    /// Status before the command started, restored when the outcome carries
    /// no provisional status (build success, cancellation).
    prev: Status,
}

/// Mutable per-service record. Internal to the registry.
#[derive(Debug, Clone)]
struct ServiceState {
    status: Status,
    in_flight: Option<InFlight>,
    last_error: Option<String>,
    container_id: Option<String>,
}

impl ServiceState {
    fn new() -> Self {
        Self {
            status: Status::Unknown,
            in_flight: None,
            last_error: None,
            container_id: None,
        }
    }
}

/// Per-project record: the immutable project plus live service states.
#[derive(Debug, Clone)]
struct ProjectState {
    project: Project,
    services: HashMap<String, ServiceState>,
    poll_error: Option<String>,
}

/// The in-memory store of all projects and services.
///
/// Only the reconciler task holds a `Registry`; all mutation goes through
/// its `apply_*` methods, each of which is a single atomic step from the
/// reader's point of view (readers only see published snapshots).
#[derive(Debug, Default)]
pub struct Registry {
    projects: Vec<ProjectState>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn project_mut(&mut self, path: &Path) -> Option<&mut ProjectState> {
        self.projects.iter_mut().find(|p| p.project.path == path)
    }

    fn service_mut(&mut self, key: &ServiceKey) -> Option<&mut ServiceState> {
        self.project_mut(&key.project)
            .and_then(|p| p.services.get_mut(&key.service))
    }

    /// Replace the entire project set (initial discovery or full refresh).
    pub fn apply_discovered(&mut self, projects: Vec<Project>) {
        self.projects = projects
            .into_iter()
            .map(|project| {
                let services = project
                    .services
                    .iter()
                    .map(|name| (name.clone(), ServiceState::new()))
                    .collect();
                ProjectState {
                    project,
                    services,
                    poll_error: None,
                }
            })
            .collect();
    }

    /// Apply one poll result for one project.
    ///
    /// Services with an in-flight command are left untouched: the command's
    /// transition takes precedence until it completes. A failed poll retains
    /// all previously known statuses and only records the failure.
    pub fn apply_poll(
        &mut self,
        project: &Path,
        result: std::result::Result<Vec<RawStatus>, String>,
    ) {
        let Some(state) = self.project_mut(project) else {
            tracing::debug!("Poll result for unknown project {}", project.display());
            return;
        };

        let statuses = match result {
            Ok(statuses) => statuses,
            Err(message) => {
                tracing::warn!(
                    "Poll failed for project '{}': {}",
                    state.project.name,
                    message
                );
                state.poll_error = Some(message);
                return;
            }
        };

        state.poll_error = None;

        let by_service: HashMap<&str, &RawStatus> = statuses
            .iter()
            .map(|raw| (raw.service.as_str(), raw))
            .collect();

        for (name, svc) in state.services.iter_mut() {
            if svc.in_flight.is_some() {
                continue;
            }
            match by_service.get(name.as_str()) {
                Some(raw) => {
                    svc.status = Status::from_raw(&raw.state);
                    svc.container_id = raw.container_id.clone();
                }
                // Not listed by the tool: no container exists for it.
                None => {
                    svc.status = Status::Stopped;
                    svc.container_id = None;
                }
            }
        }
    }

    /// Check-and-set the in-flight command for a service.
    ///
    /// Rejects with [`Error::CommandAlreadyInProgress`] if any mutating
    /// command is already running against the same service; on acceptance
    /// the transient status is applied in the same step.
    pub fn begin_command(&mut self, key: &ServiceKey, kind: CommandKind) -> Result<()> {
        let service = key.to_string();
        let svc = self
            .service_mut(key)
            .ok_or_else(|| Error::ServiceNotFound(service.clone()))?;

        if let Some(running) = svc.in_flight {
            return Err(Error::CommandAlreadyInProgress {
                service,
                kind: running.kind.to_string(),
            });
        }

        svc.in_flight = Some(InFlight {
            kind,
            prev: svc.status,
        });
        svc.status = kind.transient_status();
        Ok(())
    }

    /// Apply a command's terminal outcome.
    pub fn finish_command(&mut self, key: &ServiceKey, outcome: &Outcome) {
        let Some(svc) = self.service_mut(key) else {
            // Project set was replaced while the command ran. Nothing to update.
            tracing::debug!("Command outcome for vanished service {}", key);
            return;
        };

        let Some(in_flight) = svc.in_flight.take() else {
            tracing::warn!("Command outcome for {} with no in-flight command", key);
            return;
        };

        match outcome {
            Outcome::Success => {
                svc.status = in_flight.kind.success_status().unwrap_or(in_flight.prev);
                svc.last_error = None;
            }
            Outcome::Failed { exit_code, detail } => {
                svc.status = Status::Error;
                svc.last_error = Some(match exit_code {
                    Some(code) => format!("{} failed (exit {}): {}", in_flight.kind, code, detail),
                    None => format!("{} failed: {}", in_flight.kind, detail),
                });
            }
            Outcome::Cancelled => {
                svc.status = in_flight.prev;
                svc.last_error = Some(format!("{} cancelled", in_flight.kind));
            }
        }
    }

    /// Produce a consistent, immutable copy of the full registry.
    pub fn snapshot(&self) -> Snapshot {
        let projects = self
            .projects
            .iter()
            .map(|p| {
                let services = p
                    .project
                    .services
                    .iter()
                    .map(|name| {
                        let state = p
                            .services
                            .get(name)
                            .cloned()
                            .unwrap_or_else(ServiceState::new);
                        ServiceRow {
                            key: ServiceKey::new(p.project.path.clone(), name.clone()),
                            name: name.clone(),
                            status: state.status,
                            in_flight: state.in_flight.map(|c| c.kind),
                            last_error: state.last_error,
                            container_id: state.container_id,
                        }
                    })
                    .collect();
                ProjectView {
                    name: p.project.name.clone(),
                    path: p.project.path.clone(),
                    services,
                    parse_errors: p.project.errors.clone(),
                    poll_error: p.poll_error.clone(),
                }
            })
            .collect();

        Snapshot {
            projects,
            generated_at: Utc::now(),
        }
    }
}

/// Read-only copy of the registry for rendering. Never exposes a state
/// mid-mutation: the reconciler publishes one after each fully-applied event.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub projects: Vec<ProjectView>,
    pub generated_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self {
            projects: Vec::new(),
            generated_at: Utc::now(),
        }
    }

    /// All service rows across all projects, in discovery order.
    pub fn rows(&self) -> impl Iterator<Item = (&ProjectView, &ServiceRow)> {
        self.projects
            .iter()
            .flat_map(|p| p.services.iter().map(move |s| (p, s)))
    }

    /// All accumulated parse errors, in discovery order.
    pub fn parse_errors(&self) -> Vec<ParseError> {
        self.projects
            .iter()
            .flat_map(|p| p.parse_errors.iter().cloned())
            .collect()
    }

    /// Projects eligible for polling: those whose service list is known.
    /// A project with a fatal parse error has no services to query.
    pub fn poll_targets(&self) -> Vec<PathBuf> {
        self.projects
            .iter()
            .filter(|p| !p.services.is_empty())
            .map(|p| p.path.clone())
            .collect()
    }

    pub fn service(&self, key: &ServiceKey) -> Option<&ServiceRow> {
        self.projects
            .iter()
            .find(|p| p.path == key.project)
            .and_then(|p| p.services.iter().find(|s| s.name == key.service))
    }
}

#[derive(Debug, Clone)]
pub struct ProjectView {
    pub name: String,
    pub path: PathBuf,
    pub services: Vec<ServiceRow>,
    pub parse_errors: Vec<ParseError>,
    pub poll_error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ServiceRow {
    pub key: ServiceKey,
    pub name: String,
    pub status: Status,
    pub in_flight: Option<CommandKind>,
    pub last_error: Option<String>,
    pub container_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project(name: &str, services: &[&str]) -> Project {
        Project::new(
            PathBuf::from(format!("/tmp/{}/docker-compose.yml", name)),
            services.iter().map(|s| s.to_string()).collect(),
            Vec::new(),
        )
    }

    fn raw(service: &str, state: &str) -> RawStatus {
        RawStatus {
            service: service.to_string(),
            state: state.to_string(),
            container_id: None,
        }
    }

    #[test]
    fn status_mapping_is_total() {
        assert_eq!(Status::from_raw("running"), Status::Running);
        assert_eq!(Status::from_raw("exited"), Status::Stopped);
        assert_eq!(Status::from_raw("created"), Status::Stopped);
        assert_eq!(Status::from_raw("restarting"), Status::Loading);
        assert_eq!(Status::from_raw("dead"), Status::Error);
        assert_eq!(Status::from_raw("paused"), Status::Other);
        assert_eq!(Status::from_raw("some-future-state"), Status::Other);
        assert_eq!(Status::from_raw(""), Status::Unknown);
        assert_eq!(Status::from_raw("  Running "), Status::Running);
    }

    #[test]
    fn discovery_populates_services_as_unknown() {
        let mut registry = Registry::new();
        registry.apply_discovered(vec![project("api", &["web", "db"])]);

        let snap = registry.snapshot();
        assert_eq!(snap.projects.len(), 1);
        assert_eq!(snap.projects[0].services.len(), 2);
        for svc in &snap.projects[0].services {
            assert_eq!(svc.status, Status::Unknown);
        }
    }

    #[test]
    fn poll_sets_statuses_and_defaults_missing_to_stopped() {
        let mut registry = Registry::new();
        let p = project("api", &["web", "db"]);
        let path = p.path.clone();
        registry.apply_discovered(vec![p]);

        registry.apply_poll(&path, Ok(vec![raw("web", "running")]));

        let snap = registry.snapshot();
        let web = snap.service(&ServiceKey::new(&path, "web")).unwrap();
        let db = snap.service(&ServiceKey::new(&path, "db")).unwrap();
        assert_eq!(web.status, Status::Running);
        assert_eq!(db.status, Status::Stopped);
    }

    #[test]
    fn in_flight_command_shields_service_from_poll() {
        let mut registry = Registry::new();
        let p = project("api", &["web"]);
        let path = p.path.clone();
        registry.apply_discovered(vec![p]);
        let key = ServiceKey::new(&path, "web");

        registry.begin_command(&key, CommandKind::Start).unwrap();
        // A stale poll from before the command started must not win.
        registry.apply_poll(&path, Ok(vec![raw("web", "exited")]));

        assert_eq!(registry.snapshot().service(&key).unwrap().status, Status::Loading);

        registry.finish_command(&key, &Outcome::Success);
        assert_eq!(registry.snapshot().service(&key).unwrap().status, Status::Running);

        // After completion the next poll is authoritative again.
        registry.apply_poll(&path, Ok(vec![raw("web", "exited")]));
        assert_eq!(registry.snapshot().service(&key).unwrap().status, Status::Stopped);
    }

    #[test]
    fn second_command_rejected_while_first_in_flight() {
        let mut registry = Registry::new();
        let p = project("api", &["web"]);
        let path = p.path.clone();
        registry.apply_discovered(vec![p]);
        let key = ServiceKey::new(&path, "web");

        registry.begin_command(&key, CommandKind::Start).unwrap();
        let err = registry.begin_command(&key, CommandKind::Stop).unwrap_err();
        assert!(matches!(err, Error::CommandAlreadyInProgress { .. }));

        // Registry unchanged by the rejected request.
        assert_eq!(registry.snapshot().service(&key).unwrap().status, Status::Loading);
    }

    #[test]
    fn failed_command_surfaces_error_status_and_diagnostic() {
        let mut registry = Registry::new();
        let p = project("api", &["web"]);
        let path = p.path.clone();
        registry.apply_discovered(vec![p]);
        let key = ServiceKey::new(&path, "web");

        registry.begin_command(&key, CommandKind::Start).unwrap();
        registry.finish_command(
            &key,
            &Outcome::Failed {
                exit_code: Some(1),
                detail: "no such image".to_string(),
            },
        );

        let snap = registry.snapshot();
        let web = snap.service(&key).unwrap();
        assert_eq!(web.status, Status::Error);
        assert!(web.last_error.as_ref().unwrap().contains("no such image"));
    }

    #[test]
    fn build_success_restores_previous_status() {
        let mut registry = Registry::new();
        let p = project("api", &["web"]);
        let path = p.path.clone();
        registry.apply_discovered(vec![p]);
        let key = ServiceKey::new(&path, "web");

        registry.apply_poll(&path, Ok(vec![raw("web", "running")]));
        registry.begin_command(&key, CommandKind::Build).unwrap();
        assert_eq!(registry.snapshot().service(&key).unwrap().status, Status::Building);

        registry.finish_command(&key, &Outcome::Success);
        assert_eq!(registry.snapshot().service(&key).unwrap().status, Status::Running);
    }

    #[test]
    fn poll_failure_retains_known_statuses() {
        let mut registry = Registry::new();
        let p1 = project("api", &["web"]);
        let p2 = project("jobs", &["worker"]);
        let (path1, path2) = (p1.path.clone(), p2.path.clone());
        registry.apply_discovered(vec![p1, p2]);

        registry.apply_poll(&path1, Ok(vec![raw("web", "running")]));
        registry.apply_poll(&path2, Ok(vec![raw("worker", "running")]));

        registry.apply_poll(&path1, Err("docker not reachable".to_string()));

        let snap = registry.snapshot();
        assert_eq!(
            snap.service(&ServiceKey::new(&path1, "web")).unwrap().status,
            Status::Running
        );
        assert_eq!(
            snap.service(&ServiceKey::new(&path2, "worker")).unwrap().status,
            Status::Running
        );
        assert_eq!(
            snap.projects[0].poll_error.as_deref(),
            Some("docker not reachable")
        );
        assert!(snap.projects[1].poll_error.is_none());
    }

    #[test]
    fn parse_error_project_is_not_a_poll_target() {
        let mut registry = Registry::new();
        let broken = Project::new(
            PathBuf::from("/tmp/broken/docker-compose.yml"),
            Vec::new(),
            vec![ParseError {
                path: PathBuf::from("/tmp/broken/docker-compose.yml"),
                message: "bad yaml".to_string(),
            }],
        );
        let ok = project("api", &["web"]);
        let ok_path = ok.path.clone();
        registry.apply_discovered(vec![broken, ok]);

        let snap = registry.snapshot();
        assert_eq!(snap.poll_targets(), vec![ok_path]);
        assert_eq!(snap.parse_errors().len(), 1);
    }

    #[test]
    fn rediscovery_replaces_project_set() {
        let mut registry = Registry::new();
        registry.apply_discovered(vec![project("api", &["web"])]);
        registry.apply_discovered(vec![project("jobs", &["worker"])]);

        let snap = registry.snapshot();
        assert_eq!(snap.projects.len(), 1);
        assert_eq!(snap.projects[0].name, "jobs");
    }
}

//! Centralized Docker Compose CLI client.
//!
//! All compose interactions go through [`ComposeClient`], which provides
//! consistent timeout handling, error mapping to [`ComposeError`], and a single
//! point where the compose subprocess is constructed. Compose v2
//! (`docker compose`) is preferred, falling back to the v1 `docker-compose`
//! binary; detection is cached process-wide.

use super::ComposeError;
use crate::registry::CommandKind;
use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::OnceCell;

/// Timeout for batched status queries. Polls must never wedge the dashboard.
const PS_TIMEOUT: Duration = Duration::from_secs(10);

/// Docker Compose command flavor (v1 or v2).
#[derive(Debug, Clone, Copy)]
enum ComposeCommand {
    V2, // docker compose
    V1, // docker-compose
}

/// Global cache for compose command detection.
static COMPOSE_COMMAND: OnceCell<ComposeCommand> = OnceCell::const_new();

impl ComposeCommand {
    /// Detect which docker compose command is available.
    async fn detect() -> Result<ComposeCommand, ComposeError> {
        let v2_check = Command::new("docker")
            .args(["compose", "version"])
            .output()
            .await;

        if let Ok(output) = v2_check {
            if output.status.success() {
                return Ok(ComposeCommand::V2);
            }
        }

        let v1_check = Command::new("docker-compose")
            .args(["--version"])
            .output()
            .await;

        if let Ok(output) = v1_check {
            if output.status.success() {
                return Ok(ComposeCommand::V1);
            }
        }

        Err(ComposeError::NotInstalled)
    }

    /// Get the compose command (cached).
    async fn get() -> Result<ComposeCommand, ComposeError> {
        COMPOSE_COMMAND
            .get_or_try_init(|| async { Self::detect().await })
            .await
            .copied()
    }

    fn command_and_args(&self) -> (&'static str, Vec<&'static str>) {
        match self {
            ComposeCommand::V2 => ("docker", vec!["compose"]),
            ComposeCommand::V1 => ("docker-compose", vec![]),
        }
    }
}

/// One row of `docker compose ps --format json` output.
#[derive(Debug, Clone, Deserialize)]
pub struct PsEntry {
    #[serde(rename = "Service")]
    pub service: String,
    #[serde(rename = "State")]
    pub state: String,
    #[serde(rename = "ID", default)]
    pub container_id: Option<String>,
}

/// Centralized client for Docker Compose operations.
///
/// Cheap to clone; construct once with [`ComposeClient::detect`] and thread
/// through the application. Tests construct one over a stub program with
/// [`ComposeClient::with_command`].
#[derive(Debug, Clone)]
pub struct ComposeClient {
    program: String,
    base_args: Vec<String>,
}

impl ComposeClient {
    /// Build a client for whichever compose flavor is installed.
    pub async fn detect() -> Result<Self, ComposeError> {
        let (program, base_args) = ComposeCommand::get().await?.command_and_args();
        Ok(Self {
            program: program.to_string(),
            base_args: base_args.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Build a client over an arbitrary program. Test seam: lets integration
    /// tests substitute a stub script for the real compose binary.
    pub fn with_command(program: impl Into<String>, base_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            base_args,
        }
    }

    /// Base command: program + flavor args, running in the project directory.
    fn command(&self, project_dir: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.base_args).current_dir(project_dir);
        cmd
    }

    fn describe(&self, args: &[&str]) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.base_args.iter().cloned());
        parts.extend(args.iter().map(|s| s.to_string()));
        parts.join(" ")
    }

    // ========================================================================
    // Status query
    // ========================================================================

    /// Query the live state of every service in a project with one
    /// invocation: `ps --all --format json`.
    pub async fn ps(&self, project_dir: &Path) -> Result<Vec<PsEntry>, ComposeError> {
        let args = ["ps", "--all", "--format", "json"];
        let cmd_str = self.describe(&args);

        let mut cmd = self.command(project_dir);
        cmd.args(args);

        let result = tokio::time::timeout(PS_TIMEOUT, cmd.output()).await;
        let output = match result {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(ComposeError::spawn(cmd_str, e)),
            Err(_) => return Err(ComposeError::timeout(project_dir, cmd_str, PS_TIMEOUT)),
        };

        if !output.status.success() {
            return Err(ComposeError::failed(project_dir, cmd_str, &output));
        }

        Ok(Self::parse_ps_output(&String::from_utf8_lossy(
            &output.stdout,
        )))
    }

    /// Parse `ps --format json` output.
    ///
    /// Compose v2 emits newline-delimited JSON objects; older builds emit a
    /// single JSON array. Accept both, skipping lines that don't parse.
    fn parse_ps_output(stdout: &str) -> Vec<PsEntry> {
        if let Ok(entries) = serde_json::from_str::<Vec<PsEntry>>(stdout) {
            return entries;
        }

        stdout
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| serde_json::from_str::<PsEntry>(line).ok())
            .collect()
    }

    // ========================================================================
    // Lifecycle / logs
    // ========================================================================

    /// Spawn a lifecycle command for one service with piped output.
    ///
    /// The caller owns the [`Child`] and is responsible for draining its
    /// output and reaping it. `kill_on_drop` is set so an abandoned
    /// child cannot outlive the dashboard.
    pub fn spawn_lifecycle(
        &self,
        project_dir: &Path,
        service: &str,
        kind: CommandKind,
    ) -> Result<Child, ComposeError> {
        let args: Vec<&str> = match kind {
            CommandKind::Start => vec!["up", "-d", service],
            CommandKind::Stop => vec!["stop", service],
            CommandKind::Restart => vec!["restart", service],
            CommandKind::Build => vec!["build", service],
        };
        let cmd_str = self.describe(&args);

        let mut cmd = self.command(project_dir);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        cmd.spawn().map_err(|e| ComposeError::spawn(cmd_str, e))
    }

    /// Spawn a long-lived log tail for one service with piped output.
    ///
    /// Infinite in principle; the caller must terminate it explicitly (see
    /// the log streamer's cancellation path).
    pub fn spawn_logs(
        &self,
        project_dir: &Path,
        service: &str,
        tail: usize,
    ) -> Result<Child, ComposeError> {
        let tail_str = tail.to_string();
        let args = ["logs", "--follow", "--tail", tail_str.as_str(), service];
        let cmd_str = self.describe(&args);

        let mut cmd = self.command(project_dir);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        cmd.spawn().map_err(|e| ComposeError::spawn(cmd_str, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_ps_json_array() {
        let out = r#"[{"Service":"web","State":"running","ID":"abc123"},
                      {"Service":"db","State":"exited","ID":"def456"}]"#;
        let entries = ComposeClient::parse_ps_output(out);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].service, "web");
        assert_eq!(entries[0].state, "running");
        assert_eq!(entries[1].container_id.as_deref(), Some("def456"));
    }

    #[test]
    fn parse_ps_ndjson() {
        let out = "{\"Service\":\"web\",\"State\":\"running\"}\n{\"Service\":\"db\",\"State\":\"restarting\",\"ID\":\"xyz\"}\n";
        let entries = ComposeClient::parse_ps_output(out);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].state, "restarting");
        assert!(entries[0].container_id.is_none());
    }

    #[test]
    fn parse_ps_skips_garbage_lines() {
        let out = "not json\n{\"Service\":\"web\",\"State\":\"running\"}\n";
        let entries = ComposeClient::parse_ps_output(out);
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn parse_ps_empty_output() {
        assert!(ComposeClient::parse_ps_output("").is_empty());
        assert!(ComposeClient::parse_ps_output("[]").is_empty());
    }
}

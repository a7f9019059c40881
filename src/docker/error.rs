use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Error from one compose CLI interaction.
///
/// Every failure that belongs to a project carries the project directory,
/// so the dashboard can attach it to the right row without re-deriving
/// context from the command line.
#[derive(Debug)]
pub enum ComposeError {
    /// A status query exceeded its deadline.
    Timeout {
        project: PathBuf,
        command: String,
        timeout: Duration,
    },

    /// The CLI ran and returned non-zero.
    Failed {
        project: PathBuf,
        command: String,
        stderr: String,
        exit_code: Option<i32>,
    },

    /// The CLI could not be launched at all (not in PATH, permission denied).
    Spawn {
        command: String,
        source: std::io::Error,
    },

    /// Neither `docker compose` nor `docker-compose` answered a version
    /// check.
    NotInstalled,
}

impl ComposeError {
    pub fn timeout(project: &Path, command: impl Into<String>, timeout: Duration) -> Self {
        ComposeError::Timeout {
            project: project.to_path_buf(),
            command: command.into(),
            timeout,
        }
    }

    pub fn failed(project: &Path, command: impl Into<String>, output: &std::process::Output) -> Self {
        ComposeError::Failed {
            project: project.to_path_buf(),
            command: command.into(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            exit_code: output.status.code(),
        }
    }

    pub fn spawn(command: impl Into<String>, source: std::io::Error) -> Self {
        ComposeError::Spawn {
            command: command.into(),
            source,
        }
    }

    /// True when no amount of retrying this project will help because the
    /// tool itself is unusable.
    pub fn is_tool_unavailable(&self) -> bool {
        matches!(self, ComposeError::Spawn { .. } | ComposeError::NotInstalled)
    }
}

fn project_name(project: &Path) -> std::borrow::Cow<'_, str> {
    project
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_else(|| project.to_string_lossy())
}

impl fmt::Display for ComposeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComposeError::Timeout {
                project,
                command,
                timeout,
            } => write!(
                f,
                "'{}' in project '{}' timed out after {}s",
                command,
                project_name(project),
                timeout.as_secs()
            ),
            ComposeError::Failed {
                project,
                command,
                stderr,
                exit_code,
            } => match exit_code {
                Some(code) => write!(
                    f,
                    "'{}' in project '{}' failed (exit {}): {}",
                    command,
                    project_name(project),
                    code,
                    stderr
                ),
                None => write!(
                    f,
                    "'{}' in project '{}' failed: {}",
                    command,
                    project_name(project),
                    stderr
                ),
            },
            ComposeError::Spawn { command, source } => {
                write!(f, "Failed to launch '{}': {}", command, source)
            }
            ComposeError::NotInstalled => {
                write!(f, "Docker Compose not found (tried 'docker compose' and 'docker-compose')")
            }
        }
    }
}

impl std::error::Error for ComposeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ComposeError::Spawn { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn failures_name_the_owning_project() {
        let err = ComposeError::timeout(
            &PathBuf::from("/srv/stacks/api"),
            "ps --all",
            Duration::from_secs(10),
        );
        let text = err.to_string();
        assert!(text.contains("api"));
        assert!(text.contains("10s"));
    }

    #[test]
    fn tool_unavailable_covers_spawn_and_missing_install() {
        let spawn = ComposeError::spawn(
            "docker compose up",
            std::io::Error::from(std::io::ErrorKind::NotFound),
        );
        assert!(spawn.is_tool_unavailable());
        assert!(ComposeError::NotInstalled.is_tool_unavailable());

        let failed = ComposeError::Failed {
            project: PathBuf::from("/srv/api"),
            command: "stop web".to_string(),
            stderr: "no such service".to_string(),
            exit_code: Some(1),
        };
        assert!(!failed.is_tool_unavailable());
    }
}

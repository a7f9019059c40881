use miette::Diagnostic;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    #[error("Failed to read '{path}': {source}")]
    #[diagnostic(
        code(dcman::discovery::io),
        help("Check file permissions; the file is skipped, sibling projects are unaffected")
    )]
    DiscoveryIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse '{path}': {message}")]
    #[diagnostic(
        code(dcman::compose::parse),
        help("Validate the file with `docker compose config`")
    )]
    DefinitionParse { path: PathBuf, message: String },

    #[error("A {kind} command is already in progress for '{service}'")]
    #[diagnostic(
        code(dcman::command::in_progress),
        help("Wait for the running command to finish before issuing another")
    )]
    CommandAlreadyInProgress { service: String, kind: String },

    #[error("Docker Compose is not available: {0}")]
    #[diagnostic(
        code(dcman::docker::unavailable),
        help("Check that Docker is running with `docker ps` and that Docker Compose is installed")
    )]
    ExternalToolUnavailable(String),

    #[error("Command failed: {0}")]
    #[diagnostic(code(dcman::docker::command_failed))]
    ExternalCommandFailed(String),

    #[error("Status poll failed for project '{project}': {message}")]
    #[diagnostic(
        code(dcman::poll::failed),
        help("Previously known statuses are retained; refresh with `r` once the tool recovers")
    )]
    PollFailure { project: String, message: String },

    #[error("Service not found: {0}")]
    #[diagnostic(code(dcman::service::not_found))]
    ServiceNotFound(String),

    #[error("Registry is shutting down")]
    RegistryClosed,

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns a helpful suggestion for resolving this error, if available.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Error::ExternalToolUnavailable(_) => {
                Some("Check that Docker is running: docker ps".to_string())
            }
            Error::CommandAlreadyInProgress { service, .. } => Some(format!(
                "'{}' already has a command running. Wait for it to finish.",
                service
            )),
            Error::DefinitionParse { path, .. } => Some(format!(
                "Validate the file with: docker compose -f {} config",
                path.display()
            )),
            Error::PollFailure { .. } => {
                Some("Statuses shown may be stale until the next successful poll".to_string())
            }
            _ => None,
        }
    }

    /// Formats the error with its suggestion (if any) for user-friendly display.
    pub fn with_suggestion(&self) -> String {
        match self.suggestion() {
            Some(suggestion) => format!("{}\n\nHint: {}", self, suggestion),
            None => self.to_string(),
        }
    }
}

impl From<crate::docker::ComposeError> for Error {
    fn from(err: crate::docker::ComposeError) -> Self {
        if err.is_tool_unavailable() {
            Error::ExternalToolUnavailable(err.to_string())
        } else {
            Error::ExternalCommandFailed(err.to_string())
        }
    }
}

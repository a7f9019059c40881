//! # dcman
//!
//! A live terminal dashboard over a tree of container-orchestration
//! projects.
//!
//! ## Features
//!
//! - **Discovery**: Walks a directory tree for project definition files,
//!   skipping development-environment and VCS directories
//! - **Live Status**: Periodic and on-demand polling of per-service state
//!   through the orchestration CLI
//! - **Lifecycle Commands**: Start, stop, restart, and build individual
//!   services with incremental output
//! - **Log Tailing**: Cancellable `logs --follow` streams with bounded
//!   termination
//! - **Race-Free State**: All state changes flow through a single-writer
//!   reconciler; readers get consistent snapshots
//!
//! ## Quick Start
//!
//! ```no_run
//! use dcman::{ComposeClient, Dashboard, DEFAULT_REFRESH_INTERVAL};
//!
//! # async fn example() -> dcman::Result<()> {
//! let client = ComposeClient::detect().await?;
//! let dashboard = Dashboard::new(
//!     client,
//!     std::path::PathBuf::from("."),
//!     DEFAULT_REFRESH_INTERVAL,
//! );
//!
//! let snapshot = dashboard.snapshot();
//! for (_, row) in snapshot.rows() {
//!     println!("{}: {}", row.key, row.status);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency Model
//!
//! The registry has exactly one writer, the reconciler task. Discovery,
//! polling, and command completion all arrive as events on its channel;
//! command admission is an ask so the one-command-per-service rule is
//! checked and recorded atomically. Every applied event publishes a fresh
//! [`Snapshot`] that readers observe through a watch channel.

pub mod compose;
pub mod core;
pub mod docker;
pub mod error;
pub mod executor;
pub mod logs;
pub mod poller;
pub mod registry;
pub mod tui;

// Re-export commonly used types
pub use compose::Discoverer;
pub use crate::core::{Dashboard, DEFAULT_REFRESH_INTERVAL};
pub use docker::{ComposeClient, ComposeError};
pub use error::{Error, Result};
pub use executor::{CommandStream, Executor};
pub use logs::{LogStream, LogStreamer};
pub use poller::Poller;
pub use registry::{CommandKind, ServiceKey, Snapshot, Status};

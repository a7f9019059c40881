mod cli;

use clap::Parser;
use cli::Cli;
use dcman::{ComposeClient, Dashboard, Error as DcError};
use std::path::PathBuf;
use std::time::Duration;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        if let Some(dc_error) = e.downcast_ref::<DcError>() {
            eprintln!("Error: {}", dc_error);
            if let Some(suggestion) = dc_error.suggestion() {
                eprintln!("\nHint: {}", suggestion);
            }
        } else {
            eprintln!("Error: {:#}", e);
        }
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let root = match cli.root_dir {
        Some(root) => root,
        None => std::env::current_dir()?,
    };
    if !root.is_dir() {
        anyhow::bail!("'{}' is not a directory", root.display());
    }
    let root = root.canonicalize()?;

    init_tracing()?;

    let client = ComposeClient::detect().await.map_err(DcError::from)?;

    let mut denylist: Vec<String> = dcman::compose::DEFAULT_DENYLIST
        .iter()
        .map(|s| s.to_string())
        .collect();
    denylist.extend(cli.skip);

    let refresh = Duration::from_secs(cli.refresh.max(1));
    let dashboard = Dashboard::with_denylist(client, root, denylist, refresh);

    dcman::tui::run(dashboard).await
}

/// The TUI owns the terminal, so tracing goes to a file.
fn init_tracing() -> anyhow::Result<()> {
    let log_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".dcman")
        .join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("tui.log"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::sync::Mutex::new(log_file))
        .with_ansi(false)
        .init();

    Ok(())
}

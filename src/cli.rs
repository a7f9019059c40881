use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dcman")]
#[command(about = "Live dashboard over a tree of docker-compose projects")]
pub struct Cli {
    /// Root directory to scan for compose projects (defaults to cwd)
    pub root_dir: Option<PathBuf>,

    /// Status refresh interval in seconds
    #[arg(short, long, default_value_t = 10)]
    pub refresh: u64,

    /// Extra directory names to skip while scanning (can be repeated)
    #[arg(long, value_name = "NAME")]
    pub skip: Vec<String>,
}

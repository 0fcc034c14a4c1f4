//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Tidemark CLI - Versioned schema and data migrations
#[derive(Parser, Debug)]
#[command(name = "tidemark")]
#[command(version)]
#[command(about = "Tidemark CLI - Versioned schema and data migrations", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Project root containing tidemark.json and the migrations directory
    #[arg(long, global = true, default_value = ".", env = "TIDEMARK_PROJECT_ROOT")]
    pub project_root: PathBuf,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Apply pending migrations
    Run(RunArgs),

    /// Show applied and pending migrations
    Status,

    /// Create the migration tracking collection
    Setup,

    /// Pull the remote schema into a version directory
    Pull(PullArgs),

    /// Display version information
    Version,
}

/// Arguments for the `run` command
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Report what would be applied without changing anything
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the `pull` command
#[derive(Args, Debug)]
pub struct PullArgs {
    /// Directory to write the snapshot into (e.g. migrations/v4)
    pub dir: PathBuf,
}

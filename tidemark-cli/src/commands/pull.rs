//! `tidemark pull` command - Export the remote schema into a version directory.

use std::path::Path;

use crate::cli::PullArgs;
use crate::commands::load_runner;
use crate::error::CliResult;
use crate::output::{self, success};

/// Run the pull command
pub async fn run(project_root: &Path, args: PullArgs) -> CliResult<()> {
    output::header("Pull Schema");

    let runner = load_runner(project_root)?;
    let target = if args.dir.is_absolute() {
        args.dir
    } else {
        project_root.join(args.dir)
    };

    output::info(&format!("Pulling into {}", target.display()));
    let snapshot = runner.pull(&target).await?;

    output::newline();
    success(&format!("Snapshot written to {}", snapshot.display()));
    Ok(())
}

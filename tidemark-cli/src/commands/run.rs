//! `tidemark run` command - Apply pending migrations.

use std::path::Path;

use tidemark_engine::{RunOptions, VersionState};

use crate::cli::RunArgs;
use crate::commands::load_runner;
use crate::error::CliResult;
use crate::output::{self, success};

/// Run the run command
pub async fn run(project_root: &Path, args: RunArgs) -> CliResult<()> {
    output::header(if args.dry_run { "Run (dry run)" } else { "Run" });

    let runner = load_runner(project_root)?;
    let report = runner.run(RunOptions { dry_run: args.dry_run }).await?;

    for version in &report.skipped_unrunnable {
        output::migration(&output::muted(&format!("{:<9}", "skipped")), "-", &format!("{}, no script", version));
    }
    for id in &report.skipped_applied {
        output::migration(&output::muted(&format!("{:<9}", "skipped")), id, "already applied");
    }
    for migration in &report.applied {
        let marker = if report.dry_run {
            output::state_label(VersionState::Pending)
        } else {
            output::state_label(VersionState::Applied)
        };
        output::migration(&marker, &migration.id, &migration.version);
    }

    output::newline();
    if report.is_noop() {
        success("Already up to date");
    } else if report.dry_run {
        output::info(&format!("{} migration(s) pending", report.applied.len()));
    } else {
        success(&format!(
            "Applied {} migration(s) in {:.1}s",
            report.applied.len(),
            report.duration.as_secs_f64()
        ));
    }

    Ok(())
}

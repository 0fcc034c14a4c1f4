//! `tidemark status` command - Show migration state per version.

use std::path::Path;

use tidemark_engine::VersionState;

use crate::commands::load_runner;
use crate::error::CliResult;
use crate::output::{self, warn};

/// Run the status command
pub async fn run(project_root: &Path) -> CliResult<()> {
    output::header("Migration Status");

    let runner = load_runner(project_root)?;
    let report = runner.status().await?;

    if report.versions.is_empty() {
        output::info("No version directories found");
        return Ok(());
    }

    for entry in &report.versions {
        let mut flags = Vec::new();
        if entry.has_snapshot {
            flags.push("schema");
        }
        if entry.requires_backup {
            flags.push("backup");
        }
        let id = entry.id.as_deref().unwrap_or("-");
        let flags = if flags.is_empty() {
            String::new()
        } else {
            output::muted(&format!(" [{}]", flags.join(", ")))
        };
        output::version_row(&entry.version, entry.state, &format!("{}{}", id, flags));
    }

    output::newline();
    output::kv("Applied", &report.count(VersionState::Applied).to_string());
    output::kv("Pending", &report.count(VersionState::Pending).to_string());

    if !report.orphaned.is_empty() {
        output::newline();
        warn(&format!(
            "{} applied migration(s) have no version directory: {}",
            report.orphaned.len(),
            report.orphaned.join(", ")
        ));
    }

    Ok(())
}

//! Schema sync adapter.
//!
//! Wraps the external schema-deployment CLI. The tool reads and writes a
//! working snapshot in the project root; [`SchemaTool::push`] swaps a
//! version's snapshot into that location for the duration of the push and
//! always puts the original back afterwards.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{Config, Credentials};
use crate::error::{MigrateResult, MigrationError};
use crate::process::{Invocation, ProcessOutput, ProcessRunner};
use crate::snapshot::retarget_project;

/// Resource categories synchronised by pull and push.
///
/// Categories that need an interactive login (functions, sites) are left
/// out on purpose.
pub const RESOURCE_CATEGORIES: &[&str] = &["tables", "buckets", "teams", "topics"];

/// Adapter over the schema-deployment CLI.
#[derive(Clone)]
pub struct SchemaTool {
    runner: Arc<dyn ProcessRunner>,
    program: String,
    project_root: PathBuf,
    snapshot_file: String,
    timeout: Duration,
    push_attempts: Option<u32>,
}

impl SchemaTool {
    /// Create an adapter using the program and paths from `config`.
    pub fn new(config: &Config, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            runner,
            program: config.settings.schema_tool.clone(),
            project_root: config.project_root.clone(),
            snapshot_file: config.settings.snapshot_file.clone(),
            timeout: config.command_timeout(),
            push_attempts: config.settings.push_attempts,
        }
    }

    /// Path of the tool's working snapshot.
    pub fn working_snapshot(&self) -> PathBuf {
        self.project_root.join(&self.snapshot_file)
    }

    fn invocation<I, S>(&self, args: I) -> Invocation
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Invocation::new(&self.program)
            .args(args)
            .cwd(self.project_root.clone())
            .timeout(self.timeout)
    }

    async fn exec(&self, invocation: &Invocation) -> MigrateResult<ProcessOutput> {
        tracing::debug!(command = %invocation.display(), "Running schema tool");
        self.runner.run(invocation).await.map_err(|e| {
            let reason = if e.kind() == io::ErrorKind::NotFound {
                format!("'{}' is not installed or not on PATH", self.program)
            } else {
                format!("could not start '{}': {}", self.program, e)
            };
            MigrationError::tool_unavailable(reason)
        })
    }

    /// Configure the tool for non-interactive use against the project.
    pub async fn authenticate(&self, credentials: &Credentials) -> MigrateResult<()> {
        let invocation = self.invocation([
            "client",
            "--endpoint",
            credentials.endpoint.as_str(),
            "--project-id",
            credentials.project_id.as_str(),
            "--key",
            credentials.api_key.as_str(),
        ]);
        let output = self.exec(&invocation).await?;

        if !output.success() {
            return Err(MigrationError::tool_unavailable(format!(
                "'{} client' failed: {}",
                self.program,
                output.failure_reason()
            )));
        }

        tracing::info!(project = %credentials.project_id, "Schema tool authenticated");
        Ok(())
    }

    /// Export the remote schema into `target_dir`.
    ///
    /// Individual category failures are tolerated; the run only fails if no
    /// snapshot was produced at all. A working snapshot present beforehand
    /// is set aside for the pull and put back afterwards. Returns the path
    /// of the copied snapshot.
    pub async fn pull(&self, target_dir: &Path) -> MigrateResult<PathBuf> {
        let working = self.working_snapshot();
        let guard = WorkingSnapshotGuard::acquire(working.clone())?;
        if guard.had_original() {
            tracing::debug!(path = %working.display(), "Setting existing working snapshot aside");
            tokio::fs::remove_file(&working).await?;
        }

        for &category in RESOURCE_CATEGORIES {
            let output = self.exec(&self.invocation(["pull", category])).await?;
            if !output.success() {
                tracing::warn!(
                    category = %category,
                    reason = %output.failure_reason(),
                    "Pull failed for category, continuing"
                );
            }
        }

        if !tokio::fs::try_exists(&working).await? {
            return Err(MigrationError::SnapshotMissing(format!(
                "schema tool did not produce {}",
                working.display()
            )));
        }

        tokio::fs::create_dir_all(target_dir).await?;
        let destination = target_dir.join(&self.snapshot_file);
        tokio::fs::copy(&working, &destination).await?;
        guard.restore()?;

        tracing::info!(path = %destination.display(), "Snapshot pulled");
        Ok(destination)
    }

    /// Apply `snapshot_path` to the project identified by `project_id`.
    ///
    /// The working snapshot is restored to its previous contents (or
    /// removed, if there was none) whether or not the push succeeds.
    pub async fn push(&self, snapshot_path: &Path, project_id: &str) -> MigrateResult<()> {
        let guard = WorkingSnapshotGuard::acquire(self.working_snapshot())?;

        let outcome = self.push_categories(snapshot_path, project_id).await;
        let restored = guard.restore();

        outcome?;
        restored?;
        Ok(())
    }

    async fn push_categories(&self, snapshot_path: &Path, project_id: &str) -> MigrateResult<()> {
        let content = tokio::fs::read_to_string(snapshot_path).await?;
        let retargeted = retarget_project(&content, project_id).map_err(|e| match e {
            MigrationError::Json(err) => {
                MigrationError::schema_push(format!("invalid snapshot {}: {}", snapshot_path.display(), err))
            }
            other => other,
        })?;
        tokio::fs::write(self.working_snapshot(), retargeted).await?;

        for &category in RESOURCE_CATEGORIES {
            let mut args = vec![
                "push".to_string(),
                category.to_string(),
                "--all".to_string(),
                "--force".to_string(),
            ];
            if let Some(attempts) = self.push_attempts {
                args.push("--attempts".to_string());
                args.push(attempts.to_string());
            }

            let output = self.exec(&self.invocation(args)).await.map_err(|e| match e {
                MigrationError::ToolUnavailable(reason) => MigrationError::schema_push(reason),
                other => other,
            })?;
            if !output.success() {
                return Err(MigrationError::schema_push(format!(
                    "push {} failed: {}",
                    category,
                    output.failure_reason()
                )));
            }
            tracing::debug!(category = %category, "Pushed category");
        }

        Ok(())
    }
}

/// Scoped ownership of the working snapshot file.
///
/// Captures the file's bytes on acquisition and puts them back when
/// restored or dropped.
pub struct WorkingSnapshotGuard {
    path: PathBuf,
    original: Option<Vec<u8>>,
    restored: bool,
}

impl WorkingSnapshotGuard {
    /// Take a backup of `path` (which may not exist).
    pub fn acquire(path: PathBuf) -> MigrateResult<Self> {
        let original = match std::fs::read(&path) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            original,
            restored: false,
        })
    }

    /// Whether a file existed when the guard was acquired.
    pub fn had_original(&self) -> bool {
        self.original.is_some()
    }

    fn put_back(&self) -> io::Result<()> {
        match &self.original {
            Some(bytes) => std::fs::write(&self.path, bytes),
            None => match std::fs::remove_file(&self.path) {
                Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
                _ => Ok(()),
            },
        }
    }

    /// Restore the original state, reporting failures.
    pub fn restore(mut self) -> MigrateResult<()> {
        self.restored = true;
        self.put_back()?;
        Ok(())
    }
}

impl Drop for WorkingSnapshotGuard {
    fn drop(&mut self) {
        if self.restored {
            return;
        }
        if let Err(e) = self.put_back() {
            tracing::error!(path = %self.path.display(), error = %e, "Failed to restore working snapshot");
        }
    }
}

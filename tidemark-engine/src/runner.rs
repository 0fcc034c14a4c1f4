//! Migration orchestration.
//!
//! Versions are processed strictly in ascending order. For each version that
//! has not been applied yet the runner optionally runs the backup command,
//! pushes the version's schema snapshot, waits for the pushed attributes to
//! become available, runs the migration's `up` action and finally records the
//! migration as applied. Any failure stops the run; later versions are never
//! attempted after an earlier one fails.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::client::ServiceClient;
use crate::config::Config;
use crate::error::{MigrateResult, MigrationError};
use crate::loader::MigrationLoader;
use crate::migration::{ExecutionContext, Migration, MigrationRegistry};
use crate::poller::{AttributePoller, AttributeStatusSource};
use crate::process::{Invocation, ProcessRunner, TokioProcessRunner};
use crate::snapshot::SchemaSnapshot;
use crate::store::{RemoteStateStore, StateStore};
use crate::sync::SchemaTool;
use crate::version::{Version, VersionScanner};

/// Options for [`MigrationRunner::run`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Report what would be applied without changing anything.
    pub dry_run: bool,
}

/// A migration applied (or, in a dry run, due to be applied).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMigration {
    /// Migration ID.
    pub id: String,
    /// Version directory name.
    pub version: String,
}

/// Outcome of a run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Migrations applied in this run, in order.
    pub applied: Vec<AppliedMigration>,
    /// IDs skipped because they were already applied.
    pub skipped_applied: Vec<String>,
    /// Versions skipped because they have no migration.
    pub skipped_unrunnable: Vec<String>,
    /// Wall-clock duration of the run.
    pub duration: Duration,
    /// Whether this was a dry run.
    pub dry_run: bool,
}

impl RunReport {
    /// Whether nothing was (or would be) applied.
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

/// State of a version as seen by [`MigrationRunner::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionState {
    /// Recorded in the tracking collection.
    Applied,
    /// Will run on the next `run`.
    Pending,
    /// No migration script; ignored by `run`.
    Unrunnable,
}

impl fmt::Display for VersionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Applied => write!(f, "applied"),
            Self::Pending => write!(f, "pending"),
            Self::Unrunnable => write!(f, "no script"),
        }
    }
}

/// One row of a [`StatusReport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionStatus {
    /// Version directory name.
    pub version: String,
    /// Migration ID, if the version has a migration.
    pub id: Option<String>,
    /// Current state.
    pub state: VersionState,
    /// Whether the version carries a schema snapshot.
    pub has_snapshot: bool,
    /// Whether the migration requires a backup.
    pub requires_backup: bool,
}

/// Read-only overview of all versions.
#[derive(Debug, Clone, Default)]
pub struct StatusReport {
    /// One entry per version, in order.
    pub versions: Vec<VersionStatus>,
    /// Applied IDs that no version on disk declares.
    pub orphaned: Vec<String>,
}

impl StatusReport {
    /// Number of versions in `state`.
    pub fn count(&self, state: VersionState) -> usize {
        self.versions.iter().filter(|v| v.state == state).count()
    }
}

/// Runs migrations against a project.
pub struct MigrationRunner {
    config: Config,
    client: ServiceClient,
    store: Arc<dyn StateStore>,
    attributes: Arc<dyn AttributeStatusSource>,
    processes: Arc<dyn ProcessRunner>,
    tool: SchemaTool,
    loader: MigrationLoader,
    scanner: VersionScanner,
}

impl MigrationRunner {
    /// Create a runner wired to the real service, schema tool and shell.
    pub fn new(config: Config) -> MigrateResult<Self> {
        Self::builder(config).build()
    }

    /// Start building a runner with injectable collaborators.
    pub fn builder(config: Config) -> MigrationRunnerBuilder {
        MigrationRunnerBuilder {
            config,
            registry: MigrationRegistry::new(),
            store: None,
            attributes: None,
            processes: None,
        }
    }

    /// The resolved configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Create the tracking collection if it does not exist.
    pub async fn setup(&self) -> MigrateResult<()> {
        self.store.ensure_tracking_collection().await
    }

    /// Export the remote schema into `target_dir`.
    pub async fn pull(&self, target_dir: &Path) -> MigrateResult<PathBuf> {
        self.tool.authenticate(&self.config.credentials).await?;
        self.tool.pull(target_dir).await
    }

    /// Report every version with its state, without changing anything.
    pub async fn status(&self) -> MigrateResult<StatusReport> {
        let versions = self.scanner.scan()?;
        let applied = self.store.list_applied_ids().await?;

        let mut report = StatusReport::default();
        for version in &versions {
            let entry = match self.loader.load(version)? {
                Some(migration) => VersionStatus {
                    version: version.name.clone(),
                    id: Some(migration.id().to_string()),
                    state: if applied.contains(migration.id()) {
                        VersionState::Applied
                    } else {
                        VersionState::Pending
                    },
                    has_snapshot: version.snapshot_path.is_some(),
                    requires_backup: migration.requires_backup(),
                },
                None => VersionStatus {
                    version: version.name.clone(),
                    id: None,
                    state: VersionState::Unrunnable,
                    has_snapshot: version.snapshot_path.is_some(),
                    requires_backup: false,
                },
            };
            report.versions.push(entry);
        }

        let known: BTreeSet<&str> = report.versions.iter().filter_map(|v| v.id.as_deref()).collect();
        report.orphaned = applied
            .iter()
            .filter(|id| !known.contains(id.as_str()))
            .cloned()
            .collect();
        Ok(report)
    }

    /// Apply every pending migration in order.
    pub async fn run(&self, options: RunOptions) -> MigrateResult<RunReport> {
        let started = Instant::now();
        let mut report = RunReport {
            dry_run: options.dry_run,
            ..RunReport::default()
        };

        if !options.dry_run {
            self.tool.authenticate(&self.config.credentials).await?;
            self.store.ensure_tracking_collection().await?;
        }

        let versions = self.scanner.scan()?;
        tracing::info!(count = versions.len(), root = %self.scanner.root().display(), "Discovered versions");

        let mut applied = self.store.list_applied_ids().await?;
        tracing::debug!(count = applied.len(), "Loaded applied migrations");

        for version in &versions {
            let Some(migration) = self.loader.load(version)? else {
                report.skipped_unrunnable.push(version.name.clone());
                continue;
            };
            let id = migration.id().to_string();

            if applied.contains(&id) {
                tracing::info!(version = %version.name, id = %id, "Already applied, skipping");
                report.skipped_applied.push(id);
                continue;
            }

            if options.dry_run {
                tracing::info!(version = %version.name, id = %id, "Would apply");
            } else {
                self.apply(version, migration.as_ref()).await?;
            }

            applied.insert(id.clone());
            report.applied.push(AppliedMigration {
                id,
                version: version.name.clone(),
            });
        }

        report.duration = started.elapsed();
        tracing::info!(
            applied = report.applied.len(),
            skipped = report.skipped_applied.len(),
            duration_ms = report.duration.as_millis() as u64,
            dry_run = options.dry_run,
            "Run complete"
        );
        Ok(report)
    }

    async fn apply(&self, version: &Version, migration: &dyn Migration) -> MigrateResult<()> {
        let id = migration.id();
        tracing::info!(version = %version.name, id = %id, "Applying migration");

        if migration.requires_backup() {
            self.backup(&version.name).await?;
        }

        if let Some(snapshot_path) = &version.snapshot_path {
            self.tool
                .push(snapshot_path, &self.config.credentials.project_id)
                .await?;
            tracing::info!(version = %version.name, "Schema pushed");

            let snapshot = SchemaSnapshot::load(snapshot_path).await?;
            AttributePoller::new(self.attributes.as_ref(), self.config.poll_interval())
                .with_timeout(self.config.poll_timeout())
                .wait_for_snapshot(&snapshot)
                .await?;
        }

        let ctx = ExecutionContext::new(self.client.clone(), id, &version.name);
        migration
            .up(&ctx)
            .await
            .map_err(|e| MigrationError::script(id, e.to_string()))?;
        drop(ctx);

        self.store.record_applied(id, &version.name).await?;
        tracing::info!(version = %version.name, id = %id, "Migration applied");
        Ok(())
    }

    async fn backup(&self, version: &str) -> MigrateResult<()> {
        let Some(command) = &self.config.backup_command else {
            tracing::warn!(version = %version, "Migration requires a backup but no backup command is configured");
            return Ok(());
        };

        tracing::info!(version = %version, "Running backup command");
        let invocation = Invocation::shell(command).cwd(self.config.project_root.clone());
        let output = self
            .processes
            .run(&invocation)
            .await
            .map_err(|e| MigrationError::backup(format!("could not start backup command: {}", e)))?;

        if !output.success() {
            return Err(MigrationError::backup(output.failure_reason()));
        }
        Ok(())
    }
}

/// Builder for [`MigrationRunner`].
pub struct MigrationRunnerBuilder {
    config: Config,
    registry: MigrationRegistry,
    store: Option<Arc<dyn StateStore>>,
    attributes: Option<Arc<dyn AttributeStatusSource>>,
    processes: Option<Arc<dyn ProcessRunner>>,
}

impl MigrationRunnerBuilder {
    /// Compiled-in migrations.
    pub fn registry(mut self, registry: MigrationRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Use a custom state store.
    pub fn state_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use a custom attribute status source.
    pub fn attribute_source(mut self, source: Arc<dyn AttributeStatusSource>) -> Self {
        self.attributes = Some(source);
        self
    }

    /// Use a custom process runner for the schema tool, backups and
    /// manifest commands.
    pub fn process_runner(mut self, runner: Arc<dyn ProcessRunner>) -> Self {
        self.processes = Some(runner);
        self
    }

    /// Build the runner.
    pub fn build(self) -> MigrateResult<MigrationRunner> {
        let config = self.config;
        let client = ServiceClient::new(&config.credentials)?;

        let store = match self.store {
            Some(store) => store,
            None => Arc::new(
                RemoteStateStore::new(client.clone(), config.tracking()).with_poll_interval(config.poll_interval()),
            ),
        };
        let attributes = self
            .attributes
            .unwrap_or_else(|| Arc::new(client.clone()) as Arc<dyn AttributeStatusSource>);
        let processes = self
            .processes
            .unwrap_or_else(|| Arc::new(TokioProcessRunner) as Arc<dyn ProcessRunner>);

        let tool = SchemaTool::new(&config, processes.clone());
        let loader = MigrationLoader::new(self.registry, config.credentials.clone(), processes.clone());
        let scanner = VersionScanner::new(config.migrations_dir()).snapshot_file(config.settings.snapshot_file.clone());

        Ok(MigrationRunner {
            config,
            client,
            store,
            attributes,
            processes,
            tool,
            loader,
            scanner,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{AttributeInfo, ServiceError};
    use crate::config::{Credentials, Settings};
    use crate::error::BoxError;
    use crate::process::ProcessOutput;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct MemoryStore {
        applied: Mutex<BTreeSet<String>>,
        ensured: Mutex<u32>,
    }

    #[async_trait]
    impl StateStore for MemoryStore {
        async fn ensure_tracking_collection(&self) -> MigrateResult<()> {
            *self.ensured.lock().unwrap() += 1;
            Ok(())
        }

        async fn list_applied_ids(&self) -> MigrateResult<BTreeSet<String>> {
            Ok(self.applied.lock().unwrap().clone())
        }

        async fn record_applied(&self, id: &str, _name: &str) -> MigrateResult<()> {
            if !self.applied.lock().unwrap().insert(id.to_string()) {
                return Err(MigrationError::state_write("duplicate"));
            }
            Ok(())
        }
    }

    struct Available;

    #[async_trait]
    impl AttributeStatusSource for Available {
        async fn list_attributes(&self, _: &str, _: &str) -> Result<Vec<AttributeInfo>, ServiceError> {
            Ok(Vec::new())
        }
    }

    #[derive(Default)]
    struct Shell {
        commands: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ProcessRunner for Shell {
        async fn run(&self, invocation: &Invocation) -> std::io::Result<ProcessOutput> {
            self.commands.lock().unwrap().push(invocation.display());
            Ok(ProcessOutput {
                code: Some(0),
                ..ProcessOutput::default()
            })
        }
    }

    struct Noop(&'static str);

    #[async_trait]
    impl Migration for Noop {
        fn id(&self) -> &str {
            self.0
        }

        async fn up(&self, _ctx: &ExecutionContext) -> Result<(), BoxError> {
            Ok(())
        }
    }

    fn config(root: &Path) -> Config {
        Config {
            credentials: Credentials {
                endpoint: "https://api.example.io/v1".into(),
                project_id: "prod".into(),
                api_key: "key".into(),
            },
            backup_command: None,
            settings: Settings::default(),
            project_root: root.to_path_buf(),
        }
    }

    fn runner(root: &TempDir, store: Arc<MemoryStore>, shell: Arc<Shell>, registry: MigrationRegistry) -> MigrationRunner {
        MigrationRunner::builder(config(root.path()))
            .registry(registry)
            .state_store(store)
            .attribute_source(Arc::new(Available))
            .process_runner(shell)
            .build()
            .unwrap()
    }

    fn version_dirs(root: &TempDir, names: &[&str]) {
        for name in names {
            std::fs::create_dir_all(root.path().join("migrations").join(name)).unwrap();
        }
    }

    #[tokio::test]
    async fn test_dry_run_changes_nothing() {
        let root = TempDir::new().unwrap();
        version_dirs(&root, &["v1", "v2"]);
        let store = Arc::new(MemoryStore::default());
        let shell = Arc::new(Shell::default());
        let registry = MigrationRegistry::new().register("v1", Noop("a")).register("v2", Noop("b"));

        let report = runner(&root, store.clone(), shell.clone(), registry)
            .run(RunOptions { dry_run: true })
            .await
            .unwrap();

        assert!(report.dry_run);
        assert_eq!(report.applied.len(), 2);
        assert!(store.applied.lock().unwrap().is_empty());
        assert_eq!(*store.ensured.lock().unwrap(), 0);
        assert!(shell.commands.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unrunnable_versions_are_reported() {
        let root = TempDir::new().unwrap();
        version_dirs(&root, &["v1", "v2"]);
        let store = Arc::new(MemoryStore::default());
        let registry = MigrationRegistry::new().register("v2", Noop("b"));

        let report = runner(&root, store.clone(), Arc::default(), registry)
            .run(RunOptions::default())
            .await
            .unwrap();

        assert_eq!(report.skipped_unrunnable, vec!["v1"]);
        assert_eq!(report.applied[0].id, "b");
        assert_eq!(*store.ensured.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_status_classifies_versions() {
        let root = TempDir::new().unwrap();
        version_dirs(&root, &["v1", "v2", "v3"]);
        let store = Arc::new(MemoryStore::default());
        store.applied.lock().unwrap().extend(["a".to_string(), "retired".to_string()]);
        let registry = MigrationRegistry::new().register("v1", Noop("a")).register("v3", Noop("c"));

        let runner = runner(&root, store.clone(), Arc::default(), registry);
        let status = runner.status().await.unwrap();

        let states: Vec<VersionState> = status.versions.iter().map(|v| v.state).collect();
        assert_eq!(
            states,
            vec![VersionState::Applied, VersionState::Unrunnable, VersionState::Pending]
        );
        assert_eq!(status.count(VersionState::Pending), 1);
        assert_eq!(status.orphaned, vec!["retired"]);
    }

    #[tokio::test]
    async fn test_shared_id_runs_once() {
        let root = TempDir::new().unwrap();
        version_dirs(&root, &["v1", "v2"]);
        let store = Arc::new(MemoryStore::default());
        let registry = MigrationRegistry::new().register("v1", Noop("same")).register("v2", Noop("same"));

        let report = runner(&root, store, Arc::default(), registry)
            .run(RunOptions::default())
            .await
            .unwrap();

        assert_eq!(report.applied.len(), 1);
        assert_eq!(report.skipped_applied, vec!["same"]);
    }
}

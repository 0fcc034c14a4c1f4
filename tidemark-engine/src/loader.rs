//! Migration loading.
//!
//! A version's migration comes either from the compiled-in
//! [`MigrationRegistry`] or from a `migration.toml` manifest in the version
//! directory. Manifests need no build step: their `up`/`down` actions are
//! external commands.
//!
//! ```toml
//! id = "2024-05-backfill-profiles"
//! description = "Backfill profile slugs"
//! requires_backup = true
//! up = "node backfill.mjs"
//!
//! [down]
//! program = "node"
//! args = ["revert.mjs"]
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::{Credentials, env};
use crate::error::{BoxError, MigrateResult, MigrationError};
use crate::migration::{ExecutionContext, Migration, MigrationRegistry};
use crate::process::{Invocation, ProcessRunner};
use crate::version::Version;

/// Parent environment variables passed through to manifest commands.
const INHERITED_ENV: &[&str] = &["PATH", "HOME", "SystemRoot"];

/// An action declared in a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CommandSpec {
    /// A command line run through the platform shell.
    Shell(String),
    /// A program with explicit arguments.
    Exec {
        /// Program to run.
        program: String,
        /// Arguments.
        #[serde(default)]
        args: Vec<String>,
        /// Extra environment variables.
        #[serde(default)]
        env: BTreeMap<String, String>,
    },
}

impl CommandSpec {
    fn invocation(&self) -> Invocation {
        match self {
            CommandSpec::Shell(command) => Invocation::shell(command),
            CommandSpec::Exec { program, args, env } => env.iter().fold(
                Invocation::new(program).args(args.iter().cloned()),
                |inv, (k, v)| inv.env(k.clone(), v.clone()),
            ),
        }
    }
}

/// Contents of a `migration.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MigrationManifest {
    /// Stable migration ID.
    #[serde(default)]
    pub id: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Run the backup command first.
    #[serde(default, alias = "requiresBackup")]
    pub requires_backup: bool,
    /// Forward action.
    pub up: CommandSpec,
    /// Reverse action.
    #[serde(default)]
    pub down: Option<CommandSpec>,
}

impl MigrationManifest {
    /// Parse a manifest from TOML text.
    pub fn parse(content: &str) -> MigrateResult<Self> {
        toml::from_str(content).map_err(|e| MigrationError::load(e.to_string()))
    }
}

/// A migration whose actions are external commands.
pub struct CommandMigration {
    manifest: MigrationManifest,
    dir: PathBuf,
    credentials: Credentials,
    runner: Arc<dyn ProcessRunner>,
}

impl CommandMigration {
    /// The parsed manifest.
    pub fn manifest(&self) -> &MigrationManifest {
        &self.manifest
    }

    async fn execute(&self, spec: &CommandSpec, ctx: &ExecutionContext) -> Result<(), BoxError> {
        let mut invocation = spec.invocation().cwd(self.dir.clone()).clear_env();
        for key in INHERITED_ENV {
            if let Ok(value) = std::env::var(key) {
                invocation = invocation.env(*key, value);
            }
        }
        // Manifest-declared variables come first so they cannot shadow these.
        invocation = invocation
            .env(env::ENDPOINT, &self.credentials.endpoint)
            .env(env::PROJECT_ID, &self.credentials.project_id)
            .env(env::API_KEY, &self.credentials.api_key)
            .env("MIGRATION_ID", ctx.migration_id())
            .env("MIGRATION_VERSION", ctx.version());

        let output = self.runner.run(&invocation).await?;
        for line in output.stdout.lines() {
            ctx.info(line);
        }
        for line in output.stderr.lines() {
            ctx.error(line);
        }

        if !output.success() {
            return Err(format!("'{}' failed: {}", invocation.display(), output.failure_reason()).into());
        }
        Ok(())
    }
}

#[async_trait]
impl Migration for CommandMigration {
    fn id(&self) -> &str {
        &self.manifest.id
    }

    fn description(&self) -> &str {
        &self.manifest.description
    }

    fn requires_backup(&self) -> bool {
        self.manifest.requires_backup
    }

    async fn up(&self, ctx: &ExecutionContext) -> Result<(), BoxError> {
        self.execute(&self.manifest.up, ctx).await
    }

    fn has_down(&self) -> bool {
        self.manifest.down.is_some()
    }

    async fn down(&self, ctx: &ExecutionContext) -> Result<(), BoxError> {
        match &self.manifest.down {
            Some(spec) => self.execute(spec, ctx).await,
            None => Err(format!("migration '{}' has no down action", self.manifest.id).into()),
        }
    }
}

/// Resolves a version to its migration.
#[derive(Clone)]
pub struct MigrationLoader {
    registry: MigrationRegistry,
    credentials: Credentials,
    runner: Arc<dyn ProcessRunner>,
}

impl MigrationLoader {
    /// Create a loader.
    pub fn new(registry: MigrationRegistry, credentials: Credentials, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            registry,
            credentials,
            runner,
        }
    }

    /// Load the migration for `version`.
    ///
    /// Returns `Ok(None)` when the version has neither a registered
    /// migration nor a manifest.
    pub fn load(&self, version: &Version) -> MigrateResult<Option<Arc<dyn Migration>>> {
        let migration: Arc<dyn Migration> = if let Some(registered) = self.registry.get(&version.name) {
            registered
        } else if let Some(path) = &version.script_path {
            Arc::new(self.load_manifest(path, &version.path)?)
        } else {
            tracing::info!(version = %version.name, "No migration script found, skipping");
            return Ok(None);
        };

        let id = migration.id();
        if id.trim().is_empty() {
            return Err(MigrationError::load(format!("{} does not declare an id", version.name)));
        }
        if id.trim() != id {
            return Err(MigrationError::load(format!(
                "{}: id '{}' has leading or trailing whitespace",
                version.name, id
            )));
        }
        Ok(Some(migration))
    }

    fn load_manifest(&self, path: &Path, dir: &Path) -> MigrateResult<CommandMigration> {
        let content = std::fs::read_to_string(path)?;
        let manifest = MigrationManifest::parse(&content)
            .map_err(|e| MigrationError::load(format!("{}: {}", path.display(), e)))?;

        Ok(CommandMigration {
            manifest,
            dir: dir.to_path_buf(),
            credentials: self.credentials.clone(),
            runner: self.runner.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ServiceClient;
    use crate::process::ProcessOutput;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Recorder {
        invocations: Mutex<Vec<Invocation>>,
        exit_code: i32,
    }

    #[async_trait]
    impl ProcessRunner for Recorder {
        async fn run(&self, invocation: &Invocation) -> std::io::Result<ProcessOutput> {
            self.invocations.lock().unwrap().push(invocation.clone());
            Ok(ProcessOutput {
                code: Some(self.exit_code),
                stdout: "migrated 3 rows\n".into(),
                ..ProcessOutput::default()
            })
        }
    }

    fn credentials() -> Credentials {
        Credentials {
            endpoint: "https://api.example.io/v1".into(),
            project_id: "prod".into(),
            api_key: "key".into(),
        }
    }

    fn version(dir: &Path, name: &str, manifest: Option<&str>) -> Version {
        let path = dir.join(name);
        std::fs::create_dir_all(&path).unwrap();
        let script_path = manifest.map(|content| {
            let file = path.join("migration.toml");
            std::fs::write(&file, content).unwrap();
            file
        });
        Version {
            sequence: 1,
            name: name.to_string(),
            path,
            snapshot_path: None,
            script_path,
        }
    }

    fn loader(runner: Arc<Recorder>) -> MigrationLoader {
        MigrationLoader::new(MigrationRegistry::new(), credentials(), runner)
    }

    #[test]
    fn test_parse_manifest_forms() {
        let manifest = MigrationManifest::parse(
            r#"
            id = "backfill"
            requiresBackup = true
            up = "node up.mjs"

            [down]
            program = "node"
            args = ["down.mjs"]
            env = { DRY_RUN = "0" }
            "#,
        )
        .unwrap();

        assert_eq!(manifest.id, "backfill");
        assert!(manifest.requires_backup);
        assert_eq!(manifest.up, CommandSpec::Shell("node up.mjs".into()));
        assert!(matches!(manifest.down, Some(CommandSpec::Exec { ref args, .. }) if args == &["down.mjs"]));
    }

    #[test]
    fn test_manifest_without_up_is_a_load_error() {
        let err = MigrationManifest::parse("id = \"x\"").unwrap_err();
        assert!(matches!(err, MigrationError::Load(_)));
    }

    #[test]
    fn test_load_rejects_missing_id() {
        let dir = TempDir::new().unwrap();
        let v = version(dir.path(), "v1", Some("description = \"no id\"\nup = \"true\""));

        let err = loader(Arc::default()).load(&v).err().unwrap();
        assert!(matches!(err, MigrationError::Load(ref msg) if msg.contains("v1")));
    }

    #[test]
    fn test_load_rejects_padded_id() {
        let dir = TempDir::new().unwrap();
        let v = version(dir.path(), "v1", Some("id = \"A \"\nup = \"true\""));

        let err = loader(Arc::default()).load(&v).err().unwrap();
        assert!(matches!(err, MigrationError::Load(ref msg) if msg.contains("whitespace")));
    }

    #[test]
    fn test_load_rejects_padded_registry_id() {
        struct Padded;

        #[async_trait]
        impl Migration for Padded {
            fn id(&self) -> &str {
                " seed"
            }

            async fn up(&self, _ctx: &ExecutionContext) -> Result<(), BoxError> {
                Ok(())
            }
        }

        let dir = TempDir::new().unwrap();
        let v = version(dir.path(), "v1", None);
        let registry = MigrationRegistry::new().register("v1", Padded);
        let loader = MigrationLoader::new(registry, credentials(), Arc::new(Recorder::default()));

        assert!(matches!(loader.load(&v), Err(MigrationError::Load(_))));
    }

    #[test]
    fn test_load_malformed_manifest() {
        let dir = TempDir::new().unwrap();
        let v = version(dir.path(), "v1", Some("id = [unterminated"));

        let err = loader(Arc::default()).load(&v).err().unwrap();
        assert!(matches!(err, MigrationError::Load(_)));
    }

    #[test]
    fn test_version_without_script_is_skipped() {
        let dir = TempDir::new().unwrap();
        let v = version(dir.path(), "v1", None);
        assert!(loader(Arc::default()).load(&v).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_command_runs_with_scoped_environment() {
        let dir = TempDir::new().unwrap();
        let v = version(
            dir.path(),
            "v2",
            Some("id = \"backfill\"\nup = { program = \"node\", args = [\"up.mjs\"], env = { API_KEY = \"spoofed\" } }"),
        );
        let runner = Arc::new(Recorder::default());
        let migration = loader(runner.clone()).load(&v).unwrap().unwrap();

        let client = ServiceClient::new(&credentials()).unwrap();
        let ctx = ExecutionContext::new(client, migration.id(), &v.name);
        migration.up(&ctx).await.unwrap();

        let invocations = runner.invocations.lock().unwrap();
        let inv = &invocations[0];
        assert_eq!(inv.display(), "node up.mjs");
        assert_eq!(inv.cwd.as_deref(), Some(v.path.as_path()));
        assert!(inv.clear_env);

        // Last value wins when the process environment is built.
        let api_key = inv.env.iter().rev().find(|(k, _)| k == "API_KEY").map(|(_, v)| v.as_str());
        assert_eq!(api_key, Some("key"));
        assert!(inv.env.contains(&("MIGRATION_ID".to_string(), "backfill".to_string())));
        assert!(inv.env.contains(&("MIGRATION_VERSION".to_string(), "v2".to_string())));
    }

    #[tokio::test]
    async fn test_command_failure_is_an_error() {
        let dir = TempDir::new().unwrap();
        let v = version(dir.path(), "v3", Some("id = \"broken\"\nup = \"exit 1\""));
        let runner = Arc::new(Recorder {
            exit_code: 1,
            ..Default::default()
        });
        let migration = loader(runner).load(&v).unwrap().unwrap();

        let client = ServiceClient::new(&credentials()).unwrap();
        let ctx = ExecutionContext::new(client, migration.id(), &v.name);
        assert!(migration.up(&ctx).await.is_err());
        assert!(!migration.has_down());
    }
}

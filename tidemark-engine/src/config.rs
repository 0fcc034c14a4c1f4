//! Configuration resolution.
//!
//! A [`Config`] is assembled from the process environment (credentials and
//! the optional backup command) and an optional `tidemark.json` settings file
//! in the project root. Resolution never touches the network.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{MigrateResult, MigrationError};

/// Settings file name (lives in project root)
pub const SETTINGS_FILE_NAME: &str = "tidemark.json";

/// Default migrations directory (relative to project root)
pub const DEFAULT_MIGRATIONS_DIR: &str = "migrations";

/// Conventional schema snapshot file name, both in version directories and
/// as the schema tool's working copy in the project root.
pub const DEFAULT_SNAPSHOT_FILE: &str = "appwrite.json";

/// Migration manifest file name inside a version directory
pub const MANIFEST_FILE_NAME: &str = "migration.toml";

/// Default schema-deployment tool binary
pub const DEFAULT_SCHEMA_TOOL: &str = "appwrite";

/// Default tracking collection ID
pub const DEFAULT_TRACKING_COLLECTION: &str = "migrations";

/// Default tracking database ID
pub const DEFAULT_TRACKING_DATABASE: &str = "tidemark";

/// Environment variable names.
pub mod env {
    /// API endpoint, e.g. `https://cloud.appwrite.io/v1`.
    pub const ENDPOINT: &str = "ENDPOINT";
    /// Target project ID.
    pub const PROJECT_ID: &str = "PROJECT_ID";
    /// Server API key.
    pub const API_KEY: &str = "API_KEY";
    /// Optional shell command run before migrations that require a backup.
    pub const BACKUP_COMMAND: &str = "BACKUP_COMMAND";
}

/// Credentials for the remote project.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// API endpoint.
    pub endpoint: String,
    /// Project ID.
    pub project_id: String,
    /// API key.
    pub api_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("endpoint", &self.endpoint)
            .field("project_id", &self.project_id)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Location of the migration-tracking collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingLocation {
    /// Parent database ID.
    pub database_id: String,
    /// Collection ID.
    pub collection_id: String,
}

/// Project-local settings read from `tidemark.json`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Tracking collection ID
    pub collection: String,

    /// Tracking database ID
    #[serde(alias = "databaseId")]
    pub database: String,

    /// Directory holding `v<N>` version directories
    pub migrations_dir: String,

    /// Snapshot file name
    pub snapshot_file: String,

    /// Schema-deployment tool binary
    pub schema_tool: String,

    /// Value passed as `--attempts` on push
    pub push_attempts: Option<u32>,

    /// Timeout for a single schema tool invocation
    pub command_timeout_secs: u64,

    /// Delay between attribute status checks
    pub poll_interval_secs: u64,

    /// Upper bound on attribute polling per table (unbounded when absent)
    pub poll_timeout_secs: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            collection: DEFAULT_TRACKING_COLLECTION.to_string(),
            database: DEFAULT_TRACKING_DATABASE.to_string(),
            migrations_dir: DEFAULT_MIGRATIONS_DIR.to_string(),
            snapshot_file: DEFAULT_SNAPSHOT_FILE.to_string(),
            schema_tool: DEFAULT_SCHEMA_TOOL.to_string(),
            push_attempts: None,
            command_timeout_secs: 300,
            poll_interval_secs: 2,
            poll_timeout_secs: None,
        }
    }
}

impl Settings {
    /// Parse settings from JSON text.
    pub fn from_json(content: &str) -> MigrateResult<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Load settings from a file, falling back to defaults.
    ///
    /// A missing file yields defaults silently; an unreadable or malformed
    /// file yields defaults with a warning.
    pub fn load_or_default(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Could not read settings file, using defaults");
                return Self::default();
            }
        };

        match Self::from_json(&content) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Malformed settings file, using defaults");
                Self::default()
            }
        }
    }
}

/// Resolved, immutable configuration for one run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Remote credentials.
    pub credentials: Credentials,
    /// Optional backup shell command.
    pub backup_command: Option<String>,
    /// Project-local settings.
    pub settings: Settings,
    /// Project root (working directory of the schema tool).
    pub project_root: PathBuf,
}

impl Config {
    /// Resolve configuration from the process environment.
    pub fn resolve(project_root: impl Into<PathBuf>) -> MigrateResult<Self> {
        Self::resolve_with(|key| std::env::var(key).ok(), project_root)
    }

    /// Resolve configuration using a custom environment lookup.
    pub fn resolve_with<F>(lookup: F, project_root: impl Into<PathBuf>) -> MigrateResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let project_root = project_root.into();
        let read = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let missing: Vec<&str> = [env::ENDPOINT, env::PROJECT_ID, env::API_KEY]
            .into_iter()
            .filter(|key| read(key).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(MigrationError::configuration(format!(
                "missing required environment variable(s): {}",
                missing.join(", ")
            )));
        }

        let credentials = Credentials {
            endpoint: read(env::ENDPOINT).unwrap_or_default(),
            project_id: read(env::PROJECT_ID).unwrap_or_default(),
            api_key: read(env::API_KEY).unwrap_or_default(),
        };

        let settings = Settings::load_or_default(&project_root.join(SETTINGS_FILE_NAME));

        Ok(Self {
            credentials,
            backup_command: read(env::BACKUP_COMMAND),
            settings,
            project_root,
        })
    }

    /// Directory containing version directories.
    pub fn migrations_dir(&self) -> PathBuf {
        self.project_root.join(&self.settings.migrations_dir)
    }

    /// The schema tool's working snapshot in the project root.
    pub fn working_snapshot_path(&self) -> PathBuf {
        self.project_root.join(&self.settings.snapshot_file)
    }

    /// Where applied migrations are tracked.
    pub fn tracking(&self) -> TrackingLocation {
        TrackingLocation {
            database_id: self.settings.database.clone(),
            collection_id: self.settings.collection.clone(),
        }
    }

    /// Timeout for one schema tool invocation.
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.settings.command_timeout_secs)
    }

    /// Delay between attribute status checks.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.settings.poll_interval_secs)
    }

    /// Optional bound on attribute polling.
    pub fn poll_timeout(&self) -> Option<Duration> {
        self.settings.poll_timeout_secs.map(Duration::from_secs)
    }
}

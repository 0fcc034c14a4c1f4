//! Error types for the migration engine.

use thiserror::Error;

use crate::client::ServiceError;

/// Result type alias for migration operations.
pub type MigrateResult<T> = Result<T, MigrationError>;

/// Boxed error returned by user migration actions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while resolving, planning or applying migrations.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Missing or invalid credentials.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The external schema-deployment tool could not be invoked.
    #[error("Schema tool unavailable: {0}")]
    ToolUnavailable(String),

    /// The schema tool did not produce a snapshot file.
    #[error("Snapshot missing: {0}")]
    SnapshotMissing(String),

    /// Pushing a schema snapshot failed.
    #[error("Schema push failed: {0}")]
    SchemaPush(String),

    /// A migration definition could not be loaded.
    #[error("Failed to load migration: {0}")]
    Load(String),

    /// Writing an applied-migration record failed.
    #[error("Failed to record migration: {0}")]
    StateWrite(String),

    /// The pre-flight backup command failed.
    #[error("Backup failed: {0}")]
    Backup(String),

    /// A migration's `up` action failed.
    #[error("Migration '{id}' failed: {message}")]
    Script {
        /// Migration ID.
        id: String,
        /// Failure message.
        message: String,
    },

    /// Attribute polling exceeded the configured bound.
    #[error("Timed out waiting for attributes of '{table}' to become available")]
    PollTimeout {
        /// Table that never settled.
        table: String,
    },

    /// Malformed or conflicting version directories.
    #[error("Invalid version: {0}")]
    InvalidVersion(String),

    /// Remote service error.
    #[error(transparent)]
    Remote(#[from] ServiceError),

    /// File system error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrationError {
    /// Create a configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a tool unavailable error.
    pub fn tool_unavailable(msg: impl Into<String>) -> Self {
        Self::ToolUnavailable(msg.into())
    }

    /// Create a schema push error.
    pub fn schema_push(msg: impl Into<String>) -> Self {
        Self::SchemaPush(msg.into())
    }

    /// Create a load error.
    pub fn load(msg: impl Into<String>) -> Self {
        Self::Load(msg.into())
    }

    /// Create a state write error.
    pub fn state_write(msg: impl Into<String>) -> Self {
        Self::StateWrite(msg.into())
    }

    /// Create a backup error.
    pub fn backup(msg: impl Into<String>) -> Self {
        Self::Backup(msg.into())
    }

    /// Create a script error for the given migration.
    pub fn script(id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Script {
            id: id.into(),
            message: msg.into(),
        }
    }

    /// Whether the failure happened before anything was changed remotely.
    pub fn is_preflight(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::ToolUnavailable(_) | Self::InvalidVersion(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MigrationError::script("add-profiles", "boom");
        let msg = err.to_string();
        assert!(msg.contains("add-profiles"));
        assert!(msg.contains("boom"));
    }

    #[test]
    fn test_is_preflight() {
        assert!(MigrationError::configuration("missing API_KEY").is_preflight());
        assert!(MigrationError::InvalidVersion("v1 and v01".into()).is_preflight());
        // Loading happens per version, after earlier versions may have run.
        assert!(!MigrationError::load("bad toml").is_preflight());
        assert!(!MigrationError::schema_push("tables").is_preflight());
        assert!(!MigrationError::state_write("conflict").is_preflight());
    }

    #[test]
    fn test_remote_error_is_transparent() {
        let err: MigrationError = ServiceError::new(404, "collection_not_found", "Collection not found").into();
        assert_eq!(err.to_string(), "Remote error 404 (collection_not_found): Collection not found");
    }
}

//! CLI error types and result alias.

use miette::Diagnostic;
use thiserror::Error;
use tidemark_engine::MigrationError;

/// Result type alias for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// CLI error types
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// IO error
    #[error("IO error: {0}")]
    #[diagnostic(code(tidemark::io))]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    #[diagnostic(
        code(tidemark::config),
        help("export the missing variables in the shell that runs tidemark")
    )]
    Config(String),

    /// Schema tool error
    #[error("Schema tool error: {0}")]
    #[diagnostic(
        code(tidemark::schema_tool),
        help("install the appwrite CLI or point `schemaTool` in tidemark.json at it")
    )]
    SchemaTool(String),

    /// Failure detected before any remote change
    #[error("{0}")]
    #[diagnostic(code(tidemark::preflight), help("nothing was changed on the remote project"))]
    Preflight(String),

    /// Migration error
    #[error("Migration error: {0}")]
    #[diagnostic(code(tidemark::migration))]
    Migration(String),

    /// Remote service error
    #[error("Remote error: {0}")]
    #[diagnostic(code(tidemark::remote))]
    Remote(String),
}

impl From<MigrationError> for CliError {
    fn from(err: MigrationError) -> Self {
        match err {
            MigrationError::Configuration(msg) => CliError::Config(msg),
            MigrationError::ToolUnavailable(msg) => CliError::SchemaTool(msg),
            MigrationError::Io(e) => CliError::Io(e),
            MigrationError::Remote(e) => CliError::Remote(e.to_string()),
            other if other.is_preflight() => CliError::Preflight(other.to_string()),
            other => CliError::Migration(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_maps_to_config() {
        let err: CliError = MigrationError::configuration("missing required environment variable(s): ENDPOINT").into();
        assert!(matches!(err, CliError::Config(_)));
        assert!(err.to_string().starts_with("Configuration error"));
        assert!(err.to_string().contains("ENDPOINT"));
    }

    #[test]
    fn test_invalid_version_is_preflight() {
        let err: CliError = MigrationError::InvalidVersion("v1 and v01 share sequence 1".into()).into();
        assert!(matches!(err, CliError::Preflight(_)));
        assert!(err.to_string().contains("v01"));
        let help = err.help().map(|h| h.to_string()).unwrap_or_default();
        assert!(help.contains("nothing was changed"));
    }

    #[test]
    fn test_load_failure_is_not_preflight() {
        let err: CliError = MigrationError::load("v2: bad manifest").into();
        assert!(matches!(err, CliError::Migration(_)));
        assert!(err.help().is_none());
    }

    #[test]
    fn test_script_failure_keeps_id() {
        let err: CliError = MigrationError::script("backfill", "exit code 1").into();
        assert!(matches!(err, CliError::Migration(ref msg) if msg.contains("backfill")));
    }
}

//! Migration definitions and their execution context.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::Arc;

use async_trait::async_trait;

use crate::client::{Documents, ServiceClient};
use crate::error::BoxError;

/// Per-run context handed to a migration's actions.
///
/// Built fresh for every version and dropped once `up` returns.
pub struct ExecutionContext {
    client: ServiceClient,
    documents: Documents,
    migration_id: String,
    version: String,
}

impl ExecutionContext {
    /// Create a context scoped to `client`.
    pub fn new(client: ServiceClient, migration_id: impl Into<String>, version: impl Into<String>) -> Self {
        let documents = client.documents();
        Self {
            client,
            documents,
            migration_id: migration_id.into(),
            version: version.into(),
        }
    }

    /// Connection to the remote project.
    pub fn client(&self) -> &ServiceClient {
        &self.client
    }

    /// Document store on the same connection.
    pub fn documents(&self) -> &Documents {
        &self.documents
    }

    /// ID of the running migration.
    pub fn migration_id(&self) -> &str {
        &self.migration_id
    }

    /// Version directory name of the running migration.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Log an informational message prefixed with the migration ID.
    pub fn info(&self, message: impl Display) {
        tracing::info!(
            target: "tidemark::script",
            version = %self.version,
            "[{}] {}",
            self.migration_id,
            message
        );
    }

    /// Log an error message prefixed with the migration ID.
    pub fn error(&self, message: impl Display) {
        tracing::error!(
            target: "tidemark::script",
            version = %self.version,
            "[{}] {}",
            self.migration_id,
            message
        );
    }
}

/// A versioned data migration.
#[async_trait]
pub trait Migration: Send + Sync {
    /// Stable, globally unique ID. Applied state is keyed on this.
    fn id(&self) -> &str;

    /// Free-form description for display.
    fn description(&self) -> &str {
        ""
    }

    /// Whether the backup command must run before this migration.
    fn requires_backup(&self) -> bool {
        false
    }

    /// Apply the migration.
    async fn up(&self, ctx: &ExecutionContext) -> Result<(), BoxError>;

    /// Whether [`Migration::down`] is implemented.
    fn has_down(&self) -> bool {
        false
    }

    /// Reverse the migration. Never called by the runner.
    async fn down(&self, ctx: &ExecutionContext) -> Result<(), BoxError> {
        let _ = ctx;
        Err(format!("migration '{}' has no down action", self.id()).into())
    }
}

/// Migrations compiled into the binary, keyed by version directory name.
#[derive(Default, Clone)]
pub struct MigrationRegistry {
    entries: BTreeMap<String, Arc<dyn Migration>>,
}

impl MigrationRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `migration` for the version directory `version`.
    pub fn register(mut self, version: impl Into<String>, migration: impl Migration + 'static) -> Self {
        self.entries.insert(version.into(), Arc::new(migration));
        self
    }

    /// Look up the migration registered for a version directory.
    pub fn get(&self, version: &str) -> Option<Arc<dyn Migration>> {
        self.entries.get(version).cloned()
    }

    /// Number of registered migrations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credentials;

    struct SeedRoles;

    #[async_trait]
    impl Migration for SeedRoles {
        fn id(&self) -> &str {
            "seed-roles"
        }

        async fn up(&self, ctx: &ExecutionContext) -> Result<(), BoxError> {
            ctx.info("seeding");
            Ok(())
        }
    }

    fn context() -> ExecutionContext {
        let client = ServiceClient::new(&Credentials {
            endpoint: "https://api.example.io/v1".into(),
            project_id: "p".into(),
            api_key: "k".into(),
        })
        .unwrap();
        ExecutionContext::new(client, "seed-roles", "v4")
    }

    #[tokio::test]
    async fn test_default_down_fails() {
        let ctx = context();
        assert!(!SeedRoles.has_down());
        assert!(!SeedRoles.requires_backup());
        let err = SeedRoles.down(&ctx).await.unwrap_err();
        assert!(err.to_string().contains("seed-roles"));
    }

    #[tokio::test]
    async fn test_context_accessors() {
        let ctx = context();
        assert_eq!(ctx.migration_id(), "seed-roles");
        assert_eq!(ctx.version(), "v4");
        assert_eq!(ctx.client().project_id(), "p");
        SeedRoles.up(&ctx).await.unwrap();
    }

    #[test]
    fn test_registry_lookup() {
        let registry = MigrationRegistry::new().register("v4", SeedRoles);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("v4").unwrap().id(), "seed-roles");
        assert!(registry.get("v5").is_none());
    }
}

//! # tidemark-engine
//!
//! Migration engine for Tidemark.
//!
//! This crate provides functionality for:
//! - Discovering `v<N>` version directories in numeric order
//! - Pushing per-version schema snapshots through the external schema tool
//! - Waiting for pushed attributes to become available before data logic runs
//! - Running data migrations from compiled-in code or `migration.toml` manifests
//! - Tracking applied migrations in a collection on the remote project
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌────────────────┐     ┌──────────────┐
//! │ Version Dirs │────▶│ Loader         │────▶│ Runner       │
//! └──────────────┘     └────────────────┘     └──────────────┘
//!                                                    │
//!              ┌─────────────────┬───────────────────┼──────────────────┐
//!              ▼                 ▼                   ▼                  ▼
//!      ┌──────────────┐  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!      │ Backup cmd   │  │ Schema Tool  │   │ Attr Poller  │   │ State Store  │
//!      └──────────────┘  └──────────────┘   └──────────────┘   └──────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use tidemark_engine::{Config, MigrationRegistry, MigrationRunner, RunOptions};
//!
//! async fn deploy() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::resolve(".")?;
//!
//!     let runner = MigrationRunner::builder(config)
//!         .registry(MigrationRegistry::new().register("v3", BackfillSlugs))
//!         .build()?;
//!
//!     let report = runner.run(RunOptions::default()).await?;
//!     println!("Applied {} migrations in {:?}", report.applied.len(), report.duration);
//!     Ok(())
//! }
//! ```
//!
//! ## Version Directories
//!
//! ```text
//! migrations/
//! ├── v1/
//! │   └── migration.toml
//! ├── v2/
//! │   ├── appwrite.json     # schema snapshot pushed before the script
//! │   └── migration.toml
//! └── v10/
//!     └── appwrite.json     # no script: skipped
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod loader;
pub mod migration;
pub mod poller;
pub mod process;
pub mod runner;
pub mod snapshot;
pub mod store;
pub mod sync;
pub mod version;

// Re-exports
pub use client::{AttributeInfo, Databases, Document, DocumentList, Documents, Query, ServiceClient, ServiceError};
pub use config::{Config, Credentials, Settings, TrackingLocation};
pub use error::{BoxError, MigrateResult, MigrationError};
pub use loader::{CommandMigration, CommandSpec, MigrationLoader, MigrationManifest};
pub use migration::{ExecutionContext, Migration, MigrationRegistry};
pub use poller::{AttributePoller, AttributeStatusSource};
pub use process::{Invocation, ProcessOutput, ProcessRunner, TokioProcessRunner};
pub use runner::{
    AppliedMigration, MigrationRunner, MigrationRunnerBuilder, RunOptions, RunReport, StatusReport, VersionState,
    VersionStatus,
};
pub use snapshot::SchemaSnapshot;
pub use store::{AppliedMigrationRecord, RemoteStateStore, StateStore};
pub use sync::{SchemaTool, WorkingSnapshotGuard};
pub use version::{Version, VersionScanner};

// Used by implementors of `Migration`.
pub use async_trait::async_trait;

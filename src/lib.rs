//! # Tidemark
//!
//! Versioned schema and data migrations for backend-as-a-service projects.
//!
//! Tidemark provides:
//! - Numbered `v<N>` version directories applied in strict order
//! - Schema snapshots pushed through the project's deployment CLI
//! - Data migrations written in Rust or as external commands
//! - At-most-once tracking in a collection on the target project
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tidemark::prelude::*;
//!
//! struct SeedRoles;
//!
//! #[async_trait]
//! impl Migration for SeedRoles {
//!     fn id(&self) -> &str {
//!         "seed-roles"
//!     }
//!
//!     async fn up(&self, ctx: &ExecutionContext) -> Result<(), BoxError> {
//!         ctx.documents()
//!             .create("app", "roles", "admin", serde_json::json!({ "name": "Admin" }))
//!             .await?;
//!         ctx.info("admin role created");
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tidemark::MigrationError> {
//!     let runner = MigrationRunner::builder(Config::resolve(".")?)
//!         .registry(MigrationRegistry::new().register("v1", SeedRoles))
//!         .build()?;
//!
//!     runner.run(RunOptions::default()).await?;
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// The migration engine.
pub mod engine {
    pub use tidemark_engine::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use tidemark_engine::{
        BoxError, Config, ExecutionContext, Migration, MigrationRegistry, MigrationRunner, RunOptions, async_trait,
    };
}

// Re-export key types at the crate root
pub use tidemark_engine::{
    Config, MigrateResult, MigrationError, MigrationRegistry, MigrationRunner, RunOptions, RunReport, StatusReport,
};

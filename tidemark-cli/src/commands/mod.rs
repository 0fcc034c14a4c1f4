//! CLI command implementations.

pub mod pull;
pub mod run;
pub mod setup;
pub mod status;
pub mod version;

use std::path::Path;

use tidemark_engine::{Config, MigrationRunner};

use crate::error::CliResult;
use crate::output;

/// Resolve configuration for `project_root` and build a runner.
pub(crate) fn load_runner(project_root: &Path) -> CliResult<MigrationRunner> {
    let config = Config::resolve(project_root)?;

    output::kv("Endpoint", &config.credentials.endpoint);
    output::kv("Project", &config.credentials.project_id);
    output::kv("Migrations", &config.migrations_dir().display().to_string());
    output::newline();

    Ok(MigrationRunner::new(config)?)
}

//! `tidemark version` command - Display version information.

use crate::error::CliResult;
use crate::output::{self, kv};

/// Package version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name
const NAME: &str = env!("CARGO_PKG_NAME");

/// Run the version command
pub async fn run() -> CliResult<()> {
    output::logo();
    output::newline();

    kv("Version", VERSION);
    kv("Binary", NAME);

    #[cfg(debug_assertions)]
    let build_mode = "debug";
    #[cfg(not(debug_assertions))]
    let build_mode = "release";

    kv("Build", build_mode);
    kv("Schema tool", tidemark_engine::config::DEFAULT_SCHEMA_TOOL);

    output::newline();
    output::section("Resources");
    kv("Synced", &tidemark_engine::sync::RESOURCE_CATEGORIES.join(", "));

    Ok(())
}

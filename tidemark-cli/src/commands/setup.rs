//! `tidemark setup` command - Create the tracking collection.

use std::path::Path;

use crate::commands::load_runner;
use crate::error::CliResult;
use crate::output::{self, success};

/// Run the setup command
pub async fn run(project_root: &Path) -> CliResult<()> {
    output::header("Setup");

    let runner = load_runner(project_root)?;
    let tracking = runner.config().tracking();

    output::step(1, 1, "Ensuring tracking collection...");
    runner.setup().await?;

    output::newline();
    success(&format!(
        "Tracking collection ready: {}/{}",
        tracking.database_id, tracking.collection_id
    ));
    Ok(())
}

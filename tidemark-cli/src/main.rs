//! Tidemark CLI - Command-line interface for Tidemark migrations.

use clap::Parser;
use miette::Diagnostic;

use tidemark_cli::cli::{Cli, Command};
use tidemark_cli::commands;
use tidemark_cli::error::CliResult;
use tidemark_cli::{logging, output};

#[tokio::main]
async fn main() {
    logging::init();

    if let Err(e) = run().await {
        output::newline();
        output::error(&e.to_string());
        if let Some(help) = e.help() {
            output::hint(&help.to_string());
        }
        std::process::exit(1);
    }
}

async fn run() -> CliResult<()> {
    let cli = Cli::parse();
    let root = cli.project_root;

    match cli.command {
        Command::Run(args) => commands::run::run(&root, args).await,
        Command::Status => commands::status::run(&root).await,
        Command::Setup => commands::setup::run(&root).await,
        Command::Pull(args) => commands::pull::run(&root, args).await,
        Command::Version => commands::version::run().await,
    }
}

//! Styled terminal output utilities.
//!
//! Progress goes to stdout; errors and their hints go to stderr so they
//! survive `tidemark run > log`.

use owo_colors::OwoColorize;
use tidemark_engine::VersionState;

/// Print a header with a tide-line underline
pub fn header(text: &str) {
    println!();
    println!("{}", text.bold().cyan());
    println!("{}", "~".repeat(text.chars().count()).blue());
    println!();
}

/// Print the Tidemark banner
pub fn logo() {
    let logo = r#"
     _   _     _                          _
    | |_(_) __| | ___ _ __ ___   __ _ _ __| | __
    | __| |/ _` |/ _ \ '_ ` _ \ / _` | '__| |/ /
    | |_| | (_| |  __/ | | | | | (_| | |  |   <
     \__|_|\__,_|\___|_| |_| |_|\__,_|_|  |_|\_\
    ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
    "#;
    println!("{}", logo.bright_cyan().bold());
}

/// Print a section header
pub fn section(text: &str) {
    println!("{}", text.bold().white());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {:<11} {}", format!("{}:", key).dimmed(), value);
}

/// Print a success message
pub fn success(text: &str) {
    println!("{} {}", "✔".green().bold(), text.green());
}

/// Print an info message
pub fn info(text: &str) {
    println!("{} {}", "ℹ".blue().bold(), text);
}

/// Print a warning message
pub fn warn(text: &str) {
    println!("{} {}", "⚠".yellow().bold(), text.yellow());
}

/// Print an error message
pub fn error(text: &str) {
    eprintln!("{} {}", "✖".red().bold(), text.red());
}

/// Print a follow-up hint for the preceding error
pub fn hint(text: &str) {
    eprintln!("  {} {}", "help:".cyan().bold(), text);
}

/// Print a step indicator
pub fn step(current: usize, total: usize, text: &str) {
    println!("{} {}", format!("[{}/{}]", current, total).dimmed(), text);
}

/// Print one migration line: `marker id (version)`
pub fn migration(marker: &str, id: &str, version: &str) {
    println!("  {} {} {}", marker, id.bold(), format!("({})", version).dimmed());
}

/// Print one `status` row: version, state label, details
pub fn version_row(version: &str, state: VersionState, details: &str) {
    println!("  {:<6} {} {}", version, state_label(state), details);
}

/// Print a newline
pub fn newline() {
    println!();
}

/// Version state as a fixed-width colored label
pub fn state_label(state: VersionState) -> String {
    let label = format!("{:<9}", state.to_string());
    match state {
        VersionState::Applied => label.green().to_string(),
        VersionState::Pending => label.yellow().to_string(),
        VersionState::Unrunnable => label.dimmed().to_string(),
    }
}

/// Style text as muted
pub fn muted(text: &str) -> String {
    text.dimmed().to_string()
}

//! Logging setup for the CLI.
//!
//! # Environment Variables
//!
//! - `TIDEMARK_DEBUG=true|1|yes` - Enable debug logging
//! - `TIDEMARK_LOG_LEVEL=trace|debug|info|warn|error` - Set the log level (default: info)
//! - `TIDEMARK_LOG_FORMAT=compact|pretty|json` - Set the output format (default: compact)
//!
//! Log lines go to stderr so they never interleave with command output.

use std::env;
use std::sync::Once;

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

static INIT: Once = Once::new();

/// Check if debug logging is enabled via `TIDEMARK_DEBUG`.
pub fn is_debug_enabled() -> bool {
    env::var("TIDEMARK_DEBUG")
        .map(|v| parse_flag(&v))
        .unwrap_or(false)
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes")
}

/// Resolve a log level name, falling back to `info` (or `debug` in debug mode).
pub fn resolve_level(level: Option<&str>, debug: bool) -> &'static str {
    let fallback = if debug { "debug" } else { "info" };
    match level.map(str::to_lowercase).as_deref() {
        Some("trace") => "trace",
        Some("debug") => "debug",
        Some("info") => "info",
        Some("warn") => "warn",
        Some("error") => "error",
        _ => fallback,
    }
}

/// Resolve a log format name, falling back to `compact`.
pub fn resolve_format(format: Option<&str>) -> &'static str {
    match format.map(str::to_lowercase).as_deref() {
        Some("pretty") => "pretty",
        Some("json") => "json",
        _ => "compact",
    }
}

/// Get the configured log level from `TIDEMARK_LOG_LEVEL`.
pub fn get_log_level() -> &'static str {
    resolve_level(env::var("TIDEMARK_LOG_LEVEL").ok().as_deref(), is_debug_enabled())
}

/// Get the configured log format from `TIDEMARK_LOG_FORMAT`.
pub fn get_log_format() -> &'static str {
    resolve_format(env::var("TIDEMARK_LOG_FORMAT").ok().as_deref())
}

/// Initialize logging. Subsequent calls are no-ops.
pub fn init() {
    INIT.call_once(|| {
        let level = get_log_level();
        let filter = EnvFilter::try_new(format!("tidemark={},tidemark_engine={},tidemark_cli={}", level, level, level))
            .unwrap_or_else(|_| EnvFilter::new("info"));

        let registry = tracing_subscriber::registry().with(filter);
        let result = match get_log_format() {
            "json" => registry.with(fmt::layer().json().with_writer(std::io::stderr)).try_init(),
            "pretty" => registry.with(fmt::layer().pretty().with_writer(std::io::stderr)).try_init(),
            _ => registry
                .with(fmt::layer().compact().with_target(false).with_writer(std::io::stderr))
                .try_init(),
        };

        if result.is_ok() {
            tracing::debug!(level = level, format = get_log_format(), "Logging initialized");
        }
    });
}

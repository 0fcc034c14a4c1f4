//! Tidemark CLI - Command-line interface for Tidemark migrations.
//!
//! This crate provides the `tidemark` binary for applying versioned schema
//! and data migrations to a backend-as-a-service project.

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod output;

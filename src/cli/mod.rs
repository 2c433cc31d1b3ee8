//! Command-line interface for smoke-forge.
//!
//! Provides the `generate` and `probe` commands.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};

//! Batch pipeline: configuration and the generation loop.

pub mod config;
pub mod runner;

pub use config::{ConfigError, GeneratorConfig};
pub use runner::{BatchRunner, BatchSummary, PromptMode, RunnerError};

//! CLI command definitions for smoke-forge.
//!
//! `generate` runs the batch pipeline; `probe` checks which local
//! text-generation endpoint is reachable.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

use crate::llm::{TextGenClient, TextGenerator};
use crate::pipeline::{BatchRunner, GeneratorConfig, PromptMode};

/// Text endpoints commonly exposed by local model servers.
const COMMON_LLM_ENDPOINTS: [&str; 3] = [
    "http://localhost:8080/v1/chat/completions",
    "http://localhost:1234/v1/chat/completions",
    "http://localhost:11434/api/generate",
];

/// Message sent by `probe`.
const PROBE_MESSAGE: &str = "Say hello!";

/// Synthetic fire/smoke image dataset generator.
#[derive(Parser)]
#[command(name = "smoke-forge")]
#[command(about = "Generate synthetic wildfire/smoke image datasets")]
#[command(version)]
#[command(
    long_about = "smoke-forge asks a local LLM for photorealistic fire/smoke scene prompts, renders them through a ComfyUI-compatible service, and records every saved image in a JSON dataset log.\n\nExample usage:\n  smoke-forge generate --count 20 --batch-size 2 --output ./fs_dataset\n  smoke-forge generate --mode custom --topic \"grass fire beside a highway at dusk\""
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Generate images and dataset records.
    #[command(alias = "gen")]
    Generate(GenerateArgs),

    /// Find a reachable text-generation endpoint.
    Probe(ProbeArgs),
}

/// Prompt source selected on the command line.
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModeArg {
    /// Sample a random scenario per image.
    Auto,
    /// Use the `--topic` text for every image.
    Custom,
}

/// Arguments for `smoke-forge generate`.
#[derive(Parser, Debug)]
pub struct GenerateArgs {
    /// Prompt source.
    #[arg(long, value_enum, default_value = "auto")]
    pub mode: ModeArg,

    /// Free-text topic for custom mode.
    #[arg(long, required_if_eq("mode", "custom"))]
    pub topic: Option<String>,

    /// Number of prompts (iterations) to run.
    #[arg(short = 'n', long)]
    pub count: Option<usize>,

    /// Images generated per prompt.
    #[arg(short = 'b', long)]
    pub batch_size: Option<u32>,

    /// Model checkpoint file name on the image service.
    #[arg(short = 'c', long)]
    pub checkpoint: Option<String>,

    /// Directory for saved images.
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// Dataset log path (defaults to <output>/metadata.json).
    #[arg(long)]
    pub metadata: Option<PathBuf>,

    /// Print the batch summary as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `smoke-forge probe`.
#[derive(Parser, Debug)]
pub struct ProbeArgs {
    /// Extra endpoint to try first; may be repeated.
    #[arg(long = "url")]
    pub urls: Vec<String>,

    /// Per-endpoint timeout in seconds.
    #[arg(long, default_value = "30")]
    pub timeout_secs: u64,
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
///
/// For more control over logging initialization, use `parse_cli()` and `run_with_cli()`.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Generate(args) => run_generate_command(args).await,
        Commands::Probe(args) => run_probe_command(args).await,
    }
}

// ============================================================================
// Generate
// ============================================================================

/// Applies command-line overrides on top of the environment configuration.
fn apply_overrides(mut config: GeneratorConfig, args: &GenerateArgs) -> GeneratorConfig {
    if let Some(count) = args.count {
        config = config.with_prompt_count(count);
    }
    if let Some(batch_size) = args.batch_size {
        config = config.with_batch_size(batch_size);
    }
    if let Some(checkpoint) = &args.checkpoint {
        config = config.with_checkpoint(checkpoint.clone());
    }
    if let Some(output) = &args.output {
        config = config.with_output_dir(output.clone());
    }
    if let Some(metadata) = &args.metadata {
        config = config.with_metadata_file(metadata.clone());
    }
    config
}

fn prompt_mode(args: &GenerateArgs) -> anyhow::Result<PromptMode> {
    match (args.mode, &args.topic) {
        (ModeArg::Auto, _) => Ok(PromptMode::Auto),
        (ModeArg::Custom, Some(topic)) if !topic.trim().is_empty() => {
            Ok(PromptMode::Custom(topic.trim().to_string()))
        }
        (ModeArg::Custom, _) => anyhow::bail!("--topic is required in custom mode"),
    }
}

async fn run_generate_command(args: GenerateArgs) -> anyhow::Result<()> {
    let config = apply_overrides(GeneratorConfig::from_env()?, &args);
    let mode = prompt_mode(&args)?;

    info!(
        comfy = %config.comfy_api_url,
        llm = %config.llm_url,
        model = %config.llm_model,
        output = %config.output_dir.display(),
        metadata = %config.metadata_path().display(),
        "Starting generation"
    );

    let mut runner = BatchRunner::from_config(&config, mode)?;
    let summary = runner.run(config.prompt_count).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("\n=== Generation Results ===");
        println!("Iterations:      {}", summary.iterations);
        println!("Images saved:    {}", summary.images_saved);
        println!("Records written: {}", summary.records_written);
        println!("Prompt failures: {}", summary.prompts_failed);
        println!("Failed jobs:     {}", summary.jobs_failed);
        println!("Timed-out jobs:  {}", summary.jobs_timed_out);
        println!("Fetch failures:  {}", summary.fetch_failures);
        println!("Dataset log:     {}", config.metadata_path().display());
    }
    Ok(())
}

// ============================================================================
// Probe
// ============================================================================

/// Endpoints to probe, in order, without duplicates.
fn probe_candidates(extra: &[String], configured: &str) -> Vec<String> {
    let mut candidates: Vec<String> = Vec::new();
    let all = extra
        .iter()
        .map(String::as_str)
        .chain(std::iter::once(configured))
        .chain(COMMON_LLM_ENDPOINTS);
    for url in all {
        if !candidates.iter().any(|c| c == url) {
            candidates.push(url.to_string());
        }
    }
    candidates
}

/// Sends the probe message to each candidate and stops at the first answer.
///
/// Returns the responding endpoint and its reply.
async fn probe_endpoints(
    candidates: &[String],
    model: &str,
    timeout: Duration,
) -> Option<(String, String)> {
    for url in candidates {
        info!(url = %url, "Probing text endpoint");
        let client = match TextGenClient::new(url.as_str(), model, 0.7, timeout) {
            Ok(client) => client,
            Err(e) => {
                warn!(url = %url, error = %e, "Could not build client");
                continue;
            }
        };
        match client.complete(PROBE_MESSAGE).await {
            Ok(reply) => return Some((url.clone(), reply)),
            Err(e) => warn!(url = %url, error = %e, "No answer"),
        }
    }
    None
}

async fn run_probe_command(args: ProbeArgs) -> anyhow::Result<()> {
    let config = GeneratorConfig::from_env()?;
    let candidates = probe_candidates(&args.urls, &config.llm_url);

    match probe_endpoints(&candidates, &config.llm_model, Duration::from_secs(args.timeout_secs)).await {
        Some((url, reply)) => {
            println!("Text endpoint reachable: {}", url);
            println!("Reply: {}", reply.trim());
            Ok(())
        }
        None => anyhow::bail!("no text endpoint answered ({} tried)", candidates.len()),
    }
}

//! Batch driver: sample, synthesize, build, run, record, repeat.
//!
//! Iterations run strictly one after another. A missing prompt, a failed or
//! timed-out job and a failed log append are each logged and counted, then the
//! loop moves on. Nothing short of finishing the configured count ends a run.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, info_span, warn, Instrument};

use super::config::{ConfigError, GeneratorConfig};
use crate::comfy::{ComfyClient, ImageBackend, JobOrchestrator, JobState};
use crate::dataset::{ArtifactRecord, DatasetRecorder};
use crate::error::{ComfyError, LlmError};
use crate::llm::{PromptSynthesizer, TextGenClient, TextGenerator};
use crate::scenario::{PromptSubject, ScenarioSampler};
use crate::workflow::WorkflowBuilder;

/// Errors that can occur while assembling a runner.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Text service client error: {0}")]
    Llm(#[from] LlmError),

    #[error("Image service client error: {0}")]
    Comfy(#[from] ComfyError),
}

/// Where prompt subjects come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptMode {
    /// A freshly sampled scenario per iteration.
    Auto,
    /// The same free-text topic every iteration.
    Custom(String),
}

/// Counters for a finished batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub iterations: usize,
    pub prompts_failed: usize,
    pub jobs_failed: usize,
    pub jobs_timed_out: usize,
    pub images_saved: usize,
    pub fetch_failures: usize,
    pub records_written: usize,
}

/// Runs the generation loop.
pub struct BatchRunner {
    sampler: ScenarioSampler,
    synthesizer: PromptSynthesizer,
    builder: WorkflowBuilder,
    orchestrator: JobOrchestrator,
    recorder: DatasetRecorder,
    mode: PromptMode,
    iteration_delay: Duration,
}

impl BatchRunner {
    pub fn new(
        synthesizer: PromptSynthesizer,
        builder: WorkflowBuilder,
        orchestrator: JobOrchestrator,
        recorder: DatasetRecorder,
    ) -> Self {
        Self {
            sampler: ScenarioSampler::default(),
            synthesizer,
            builder,
            orchestrator,
            recorder,
            mode: PromptMode::Auto,
            iteration_delay: Duration::from_secs(5),
        }
    }

    /// Wires real service clients from a validated configuration.
    pub fn from_config(config: &GeneratorConfig, mode: PromptMode) -> Result<Self, RunnerError> {
        config.validate()?;

        let text_client = TextGenClient::new(
            &config.llm_url,
            &config.llm_model,
            config.llm_temperature,
            config.llm_timeout,
        )?
        .with_malformed_line_policy(config.malformed_line_policy());
        let generator: Arc<dyn TextGenerator> = Arc::new(text_client);

        let backend: Arc<dyn ImageBackend> = Arc::new(ComfyClient::new(
            &config.comfy_api_url,
            &config.comfy_ws_url,
            config.http_timeout,
        )?);

        Ok(Self::new(
            PromptSynthesizer::new(generator),
            config.workflow_builder(),
            JobOrchestrator::new(backend, config.orchestrator_config()),
            DatasetRecorder::new(config.metadata_path()),
        )
        .with_mode(mode)
        .with_iteration_delay(config.iteration_delay))
    }

    pub fn with_mode(mut self, mode: PromptMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_sampler(mut self, sampler: ScenarioSampler) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn with_iteration_delay(mut self, delay: Duration) -> Self {
        self.iteration_delay = delay;
        self
    }

    pub fn recorder(&self) -> &DatasetRecorder {
        &self.recorder
    }

    /// Runs `count` iterations, pausing between them.
    pub async fn run(&mut self, count: usize) -> BatchSummary {
        let mut summary = BatchSummary::default();
        info!(
            count,
            mode = ?self.mode,
            scenarios = self.sampler.vocabulary().combinations(),
            "Starting batch"
        );

        for n in 1..=count {
            let span = info_span!("iteration", n, of = count);
            self.run_iteration(&mut summary).instrument(span).await;
            summary.iterations += 1;

            if n < count && !self.iteration_delay.is_zero() {
                tokio::time::sleep(self.iteration_delay).await;
            }
        }

        info!(
            iterations = summary.iterations,
            images_saved = summary.images_saved,
            records_written = summary.records_written,
            prompts_failed = summary.prompts_failed,
            jobs_failed = summary.jobs_failed,
            jobs_timed_out = summary.jobs_timed_out,
            "Batch finished"
        );
        summary
    }

    async fn run_iteration(&mut self, summary: &mut BatchSummary) {
        let subject = match &self.mode {
            PromptMode::Auto => PromptSubject::from(self.sampler.sample()),
            PromptMode::Custom(topic) => PromptSubject::topic(topic.clone()),
        };

        let Some(prompt) = self.synthesizer.synthesize(&subject).await else {
            warn!("No prompt produced; skipping iteration");
            summary.prompts_failed += 1;
            return;
        };
        info!(prompt = %prompt.text, "Prompt ready");

        let workflow = self.builder.build(&prompt.text);
        let report = self.orchestrator.run_job(&workflow).await;

        match report.state {
            JobState::Completed => {}
            JobState::TimedOut => {
                warn!(prompt_id = ?report.handle.as_ref().map(|h| h.as_str()), "Job timed out");
                summary.jobs_timed_out += 1;
                return;
            }
            _ => {
                warn!(error = ?report.error, "Job failed");
                summary.jobs_failed += 1;
                return;
            }
        }

        summary.fetch_failures += report.fetch_failures.len();
        let Some(handle) = report.handle else {
            return;
        };

        for path in &report.saved {
            summary.images_saved += 1;
            let record = ArtifactRecord::new(&prompt.text, prompt.subject.clone(), path, &handle);
            match self.recorder.append(&record).await {
                Ok(outcome) => {
                    summary.records_written += 1;
                    info!(
                        image = %path.display(),
                        total = outcome.total,
                        "Recorded image"
                    );
                }
                Err(e) => {
                    error!(image = %path.display(), error = %e, "Failed to record image");
                }
            }
        }
    }
}

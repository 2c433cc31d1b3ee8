//! Generator configuration.
//!
//! Values come from defaults, then environment variables, then CLI overrides
//! applied through the `with_*` builders.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::comfy::OrchestratorConfig;
use crate::llm::MalformedLinePolicy;
use crate::workflow::{SamplingParams, WorkflowBuilder};

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration for a generation run.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    // Image service
    /// HTTP base URL of the image service.
    pub comfy_api_url: String,
    /// Event socket URL of the image service.
    pub comfy_ws_url: String,

    // Text service
    /// Full URL of the text-generation endpoint.
    pub llm_url: String,
    pub llm_model: String,
    pub llm_temperature: f64,
    pub llm_timeout: Duration,
    /// Skip unparseable response lines instead of failing the prompt.
    pub skip_malformed_fragments: bool,

    // Output
    pub output_dir: PathBuf,
    /// Dataset log path; `<output_dir>/metadata.json` when unset.
    pub metadata_file: Option<PathBuf>,

    // Batch
    /// Number of iterations.
    pub prompt_count: usize,
    /// Images per job.
    pub batch_size: u32,
    pub iteration_delay: Duration,

    // Workflow
    pub checkpoint: String,
    pub width: u32,
    pub height: u32,
    pub sampling: SamplingParams,
    pub filename_prefix: String,

    // Job timing
    pub job_timeout: Duration,
    pub poll_interval: Duration,
    pub http_timeout: Duration,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            comfy_api_url: "http://127.0.0.1:8188".to_string(),
            comfy_ws_url: "ws://127.0.0.1:8188/ws".to_string(),

            llm_url: "http://localhost:11434/api/generate".to_string(),
            llm_model: "llama3.1".to_string(),
            llm_temperature: 0.7,
            llm_timeout: Duration::from_secs(120),
            skip_malformed_fragments: true,

            output_dir: PathBuf::from("fs_dataset"),
            metadata_file: None,

            prompt_count: 10,
            batch_size: 1,
            iteration_delay: Duration::from_secs(5),

            checkpoint: "sd_xl_base_1.0.safetensors".to_string(),
            width: 512,
            height: 512,
            sampling: SamplingParams::default(),
            filename_prefix: "FS_".to_string(),

            job_timeout: Duration::from_secs(180),
            poll_interval: Duration::from_millis(1500),
            http_timeout: Duration::from_secs(60),
        }
    }
}

impl GeneratorConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from the process environment.
    ///
    /// # Environment Variables
    ///
    /// - `COMFYUI_API_URL`: image service URL (default: http://127.0.0.1:8188).
    ///   A trailing `/prompt` is stripped.
    /// - `COMFYUI_WS_URL`: event socket URL (default: derived from the API URL)
    /// - `LLAMA_API_URL`: text endpoint (default: http://localhost:11434/api/generate)
    /// - `LLAMA_MODEL`: text model (default: llama3.1)
    /// - `LLAMA_TEMPERATURE`: sampling temperature (default: 0.7)
    /// - `FSGEN_OUTPUT_DIR`: image directory (default: fs_dataset)
    /// - `FSGEN_METADATA_FILE`: dataset log (default: <output_dir>/metadata.json)
    /// - `FSGEN_PROMPT_COUNT`: iterations (default: 10)
    /// - `FSGEN_BATCH_SIZE`: images per job (default: 1)
    /// - `FSGEN_CHECKPOINT`: model checkpoint (default: sd_xl_base_1.0.safetensors)
    /// - `FSGEN_WIDTH`, `FSGEN_HEIGHT`: image size (default: 512)
    /// - `FSGEN_STEPS`, `FSGEN_CFG`, `FSGEN_SAMPLER`, `FSGEN_SCHEDULER`, `FSGEN_DENOISE`
    /// - `FSGEN_FILENAME_PREFIX`: service-side file prefix (default: FS_)
    /// - `FSGEN_JOB_TIMEOUT_SECS` (default: 180)
    /// - `FSGEN_POLL_INTERVAL_MS` (default: 1500)
    /// - `FSGEN_ITERATION_DELAY_SECS` (default: 5)
    /// - `FSGEN_HTTP_TIMEOUT_SECS` (default: 60)
    /// - `FSGEN_SKIP_MALFORMED_FRAGMENTS` (default: true)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a variable cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) but reads variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        // Image service
        if let Some(val) = lookup("COMFYUI_API_URL") {
            config.comfy_api_url = normalize_api_url(&val);
            config.comfy_ws_url = derive_ws_url(&config.comfy_api_url);
        }
        if let Some(val) = lookup("COMFYUI_WS_URL") {
            config.comfy_ws_url = val;
        }

        // Text service
        if let Some(val) = lookup("LLAMA_API_URL") {
            config.llm_url = val;
        }
        if let Some(val) = lookup("LLAMA_MODEL") {
            config.llm_model = val;
        }
        if let Some(val) = lookup("LLAMA_TEMPERATURE") {
            config.llm_temperature = parse_env_value(&val, "LLAMA_TEMPERATURE")?;
        }
        if let Some(val) = lookup("FSGEN_SKIP_MALFORMED_FRAGMENTS") {
            config.skip_malformed_fragments = parse_env_bool(&val, "FSGEN_SKIP_MALFORMED_FRAGMENTS")?;
        }

        // Output
        if let Some(val) = lookup("FSGEN_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(val);
        }
        if let Some(val) = lookup("FSGEN_METADATA_FILE") {
            config.metadata_file = Some(PathBuf::from(val));
        }

        // Batch
        if let Some(val) = lookup("FSGEN_PROMPT_COUNT") {
            config.prompt_count = parse_env_value(&val, "FSGEN_PROMPT_COUNT")?;
        }
        if let Some(val) = lookup("FSGEN_BATCH_SIZE") {
            config.batch_size = parse_env_value(&val, "FSGEN_BATCH_SIZE")?;
        }
        if let Some(val) = lookup("FSGEN_ITERATION_DELAY_SECS") {
            let secs: u64 = parse_env_value(&val, "FSGEN_ITERATION_DELAY_SECS")?;
            config.iteration_delay = Duration::from_secs(secs);
        }

        // Workflow
        if let Some(val) = lookup("FSGEN_CHECKPOINT") {
            config.checkpoint = val;
        }
        if let Some(val) = lookup("FSGEN_WIDTH") {
            config.width = parse_env_value(&val, "FSGEN_WIDTH")?;
        }
        if let Some(val) = lookup("FSGEN_HEIGHT") {
            config.height = parse_env_value(&val, "FSGEN_HEIGHT")?;
        }
        if let Some(val) = lookup("FSGEN_STEPS") {
            config.sampling.steps = parse_env_value(&val, "FSGEN_STEPS")?;
        }
        if let Some(val) = lookup("FSGEN_CFG") {
            config.sampling.cfg = parse_env_value(&val, "FSGEN_CFG")?;
        }
        if let Some(val) = lookup("FSGEN_SAMPLER") {
            config.sampling.sampler_name = val;
        }
        if let Some(val) = lookup("FSGEN_SCHEDULER") {
            config.sampling.scheduler = val;
        }
        if let Some(val) = lookup("FSGEN_DENOISE") {
            config.sampling.denoise = parse_env_value(&val, "FSGEN_DENOISE")?;
        }
        if let Some(val) = lookup("FSGEN_FILENAME_PREFIX") {
            config.filename_prefix = val;
        }

        // Job timing
        if let Some(val) = lookup("FSGEN_JOB_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "FSGEN_JOB_TIMEOUT_SECS")?;
            config.job_timeout = Duration::from_secs(secs);
        }
        if let Some(val) = lookup("FSGEN_POLL_INTERVAL_MS") {
            let ms: u64 = parse_env_value(&val, "FSGEN_POLL_INTERVAL_MS")?;
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(val) = lookup("FSGEN_HTTP_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "FSGEN_HTTP_TIMEOUT_SECS")?;
            config.http_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.prompt_count == 0 {
            return Err(ConfigError::ValidationFailed(
                "prompt_count must be greater than 0".to_string(),
            ));
        }

        if self.batch_size == 0 {
            return Err(ConfigError::ValidationFailed(
                "batch_size must be greater than 0".to_string(),
            ));
        }

        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::ValidationFailed(
                "width and height must be greater than 0".to_string(),
            ));
        }

        if self.sampling.steps == 0 {
            return Err(ConfigError::ValidationFailed(
                "steps must be greater than 0".to_string(),
            ));
        }

        if self.job_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "job_timeout must be greater than 0".to_string(),
            ));
        }

        if self.poll_interval.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "poll_interval must be greater than 0".to_string(),
            ));
        }

        if self.http_timeout.is_zero() || self.llm_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "HTTP timeouts must be greater than 0".to_string(),
            ));
        }

        if self.checkpoint.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "checkpoint cannot be empty".to_string(),
            ));
        }

        if self.llm_model.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "llm_model cannot be empty".to_string(),
            ));
        }

        if !(0.0..=2.0).contains(&self.llm_temperature) {
            return Err(ConfigError::ValidationFailed(
                "temperature must be between 0.0 and 2.0".to_string(),
            ));
        }

        Ok(())
    }

    /// Dataset log path after applying the default.
    pub fn metadata_path(&self) -> PathBuf {
        self.metadata_file
            .clone()
            .unwrap_or_else(|| self.output_dir.join("metadata.json"))
    }

    pub fn malformed_line_policy(&self) -> MalformedLinePolicy {
        if self.skip_malformed_fragments {
            MalformedLinePolicy::Skip
        } else {
            MalformedLinePolicy::Abort
        }
    }

    /// Workflow builder carrying the configured job parameters.
    pub fn workflow_builder(&self) -> WorkflowBuilder {
        WorkflowBuilder::new(&self.checkpoint)
            .with_dimensions(self.width, self.height)
            .with_batch_size(self.batch_size)
            .with_sampling(self.sampling.clone())
            .with_filename_prefix(&self.filename_prefix)
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            job_timeout: self.job_timeout,
            poll_interval: self.poll_interval,
            output_dir: self.output_dir.clone(),
        }
    }

    /// Builder method to set the image service URL; the event URL follows it.
    pub fn with_comfy_api_url(mut self, url: impl AsRef<str>) -> Self {
        self.comfy_api_url = normalize_api_url(url.as_ref());
        self.comfy_ws_url = derive_ws_url(&self.comfy_api_url);
        self
    }

    /// Builder method to set the event socket URL.
    pub fn with_comfy_ws_url(mut self, url: impl Into<String>) -> Self {
        self.comfy_ws_url = url.into();
        self
    }

    /// Builder method to set the text endpoint.
    pub fn with_llm_url(mut self, url: impl Into<String>) -> Self {
        self.llm_url = url.into();
        self
    }

    /// Builder method to set the iteration count.
    pub fn with_prompt_count(mut self, count: usize) -> Self {
        self.prompt_count = count;
        self
    }

    /// Builder method to set images per job.
    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Builder method to set the checkpoint.
    pub fn with_checkpoint(mut self, checkpoint: impl Into<String>) -> Self {
        self.checkpoint = checkpoint.into();
        self
    }

    /// Builder method to set the output directory.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Builder method to set the dataset log path.
    pub fn with_metadata_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.metadata_file = Some(path.into());
        self
    }

    /// Builder method to set the delay between iterations.
    pub fn with_iteration_delay(mut self, delay: Duration) -> Self {
        self.iteration_delay = delay;
        self
    }

    /// Builder method to set the job timeout.
    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }

    /// Builder method to set the history poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Strips a trailing `/prompt` (and slashes) from an image service URL.
fn normalize_api_url(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    url.strip_suffix("/prompt").unwrap_or(url).to_string()
}

/// `http://host:port` becomes `ws://host:port/ws`, `https` becomes `wss`.
fn derive_ws_url(api_url: &str) -> String {
    if let Some(rest) = api_url.strip_prefix("https://") {
        format!("wss://{}/ws", rest)
    } else if let Some(rest) = api_url.strip_prefix("http://") {
        format!("ws://{}/ws", rest)
    } else {
        format!("ws://{}/ws", api_url)
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

/// Parse an environment variable as a boolean.
fn parse_env_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean value, got '{}'", value),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = GeneratorConfig::default();
        assert_eq!(config.comfy_api_url, "http://127.0.0.1:8188");
        assert_eq!(config.comfy_ws_url, "ws://127.0.0.1:8188/ws");
        assert_eq!(config.llm_url, "http://localhost:11434/api/generate");
        assert_eq!(config.llm_model, "llama3.1");
        assert!((config.llm_temperature - 0.7).abs() < f64::EPSILON);
        assert_eq!(config.prompt_count, 10);
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.checkpoint, "sd_xl_base_1.0.safetensors");
        assert_eq!((config.width, config.height), (512, 512));
        assert_eq!(config.sampling.steps, 30);
        assert_eq!(config.job_timeout, Duration::from_secs(180));
        assert_eq!(config.poll_interval, Duration::from_millis(1500));
        assert_eq!(config.iteration_delay, Duration::from_secs(5));
        assert_eq!(config.metadata_path(), PathBuf::from("fs_dataset/metadata.json"));
        assert_eq!(config.malformed_line_policy(), MalformedLinePolicy::Skip);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = GeneratorConfig::from_lookup(lookup_from(&[
            ("COMFYUI_API_URL", "http://gpu-box:8188/prompt"),
            ("LLAMA_MODEL", "mistral"),
            ("LLAMA_TEMPERATURE", "0.3"),
            ("FSGEN_PROMPT_COUNT", "25"),
            ("FSGEN_BATCH_SIZE", "4"),
            ("FSGEN_WIDTH", "1024"),
            ("FSGEN_CFG", "6.0"),
            ("FSGEN_POLL_INTERVAL_MS", "250"),
            ("FSGEN_SKIP_MALFORMED_FRAGMENTS", "off"),
            ("FSGEN_OUTPUT_DIR", "/data/smoke"),
        ]))
        .unwrap();

        assert_eq!(config.comfy_api_url, "http://gpu-box:8188");
        assert_eq!(config.comfy_ws_url, "ws://gpu-box:8188/ws");
        assert_eq!(config.llm_model, "mistral");
        assert!((config.llm_temperature - 0.3).abs() < f64::EPSILON);
        assert_eq!(config.prompt_count, 25);
        assert_eq!(config.batch_size, 4);
        assert_eq!(config.width, 1024);
        assert_eq!(config.height, 512);
        assert!((config.sampling.cfg - 6.0).abs() < f64::EPSILON);
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.malformed_line_policy(), MalformedLinePolicy::Abort);
        assert_eq!(config.metadata_path(), PathBuf::from("/data/smoke/metadata.json"));
    }

    #[test]
    fn test_explicit_ws_url_wins() {
        let config = GeneratorConfig::from_lookup(lookup_from(&[
            ("COMFYUI_API_URL", "https://comfy.example"),
            ("COMFYUI_WS_URL", "ws://events.example/ws"),
        ]))
        .unwrap();
        assert_eq!(config.comfy_api_url, "https://comfy.example");
        assert_eq!(config.comfy_ws_url, "ws://events.example/ws");

        let derived = GeneratorConfig::new().with_comfy_api_url("https://comfy.example/");
        assert_eq!(derived.comfy_ws_url, "wss://comfy.example/ws");
    }

    #[test]
    fn test_invalid_env_value() {
        let err = GeneratorConfig::from_lookup(lookup_from(&[("FSGEN_PROMPT_COUNT", "ten")]))
            .unwrap_err();
        assert!(err.to_string().contains("FSGEN_PROMPT_COUNT"));

        let err = GeneratorConfig::from_lookup(lookup_from(&[(
            "FSGEN_SKIP_MALFORMED_FRAGMENTS",
            "maybe",
        )]))
        .unwrap_err();
        assert!(err.to_string().contains("expected boolean"));
    }

    #[test]
    fn test_validation_rejects_zero_values() {
        let result = GeneratorConfig::default().with_prompt_count(0).validate();
        assert!(result.unwrap_err().to_string().contains("prompt_count"));

        let result = GeneratorConfig::default().with_batch_size(0).validate();
        assert!(result.unwrap_err().to_string().contains("batch_size"));

        let result = GeneratorConfig::default()
            .with_job_timeout(Duration::ZERO)
            .validate();
        assert!(result.unwrap_err().to_string().contains("job_timeout"));
    }

    #[test]
    fn test_builders_feed_components() {
        let config = GeneratorConfig::new()
            .with_checkpoint("dreamshaper_8.safetensors")
            .with_batch_size(2)
            .with_output_dir("out")
            .with_metadata_file("meta/log.json");

        let builder = config.workflow_builder();
        assert_eq!(builder.checkpoint(), "dreamshaper_8.safetensors");
        assert_eq!(builder.batch_size(), 2);

        let orchestrator = config.orchestrator_config();
        assert_eq!(orchestrator.output_dir, PathBuf::from("out"));
        assert_eq!(orchestrator.job_timeout, Duration::from_secs(180));
        assert_eq!(config.metadata_path(), PathBuf::from("meta/log.json"));
    }
}

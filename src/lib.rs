//! smoke-forge: synthetic wildfire/smoke image dataset generator.
//!
//! Each iteration samples a scene, asks a local text-generation service for a
//! photorealistic prompt, renders it through a ComfyUI-compatible image
//! service and records every saved image in a JSON dataset log.

pub mod cli;
pub mod comfy;
pub mod dataset;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod scenario;
pub mod workflow;

// Re-export commonly used types
pub use comfy::{ComfyClient, ImageBackend, JobHandle, JobOrchestrator, OrchestratorConfig};
pub use dataset::{ArtifactRecord, DatasetRecorder};
pub use error::{ComfyError, LlmError, RecorderError};
pub use llm::{PromptSynthesizer, TextGenClient, TextGenerator};
pub use pipeline::{BatchRunner, BatchSummary, GeneratorConfig, PromptMode};
pub use scenario::{PromptSubject, ScenarioDescriptor, ScenarioSampler};
pub use workflow::{WorkflowBuilder, WorkflowGraph};

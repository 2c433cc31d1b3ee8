//! Renders a prompt into the fixed text-to-image job graph.
//!
//! The graph shape never changes: checkpoint loader, empty latent, positive and
//! negative text encoders, sampler, VAE decoder and image saver. Only the
//! prompt text, seed, batch size, checkpoint and dimensions vary per job.

use rand::RngExt;
use serde::{Deserialize, Serialize};

use super::graph::{NodeRef, WorkflowGraph, WorkflowNode};

/// Negative prompt applied to every job.
pub const NEGATIVE_PROMPT: &str = "low quality, bad image, blurry, distorted, deformed, disfigured, text, watermark, signature, poor composition, unrealistic, cartoonish";

/// Exclusive upper bound on seeds; keeps them within the exactly-representable JSON integer range.
pub const MAX_SEED: u64 = 1 << 53;

/// Role of each node in the fixed graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRole {
    Sampler,
    Checkpoint,
    LatentImage,
    PositivePrompt,
    NegativePrompt,
    Decoder,
    Saver,
}

impl NodeRole {
    pub const ALL: [NodeRole; 7] = [
        NodeRole::Sampler,
        NodeRole::Checkpoint,
        NodeRole::LatentImage,
        NodeRole::PositivePrompt,
        NodeRole::NegativePrompt,
        NodeRole::Decoder,
        NodeRole::Saver,
    ];

    /// Node id used in the submitted graph.
    pub fn id(self) -> &'static str {
        match self {
            NodeRole::Sampler => "3",
            NodeRole::Checkpoint => "4",
            NodeRole::LatentImage => "5",
            NodeRole::PositivePrompt => "6",
            NodeRole::NegativePrompt => "7",
            NodeRole::Decoder => "8",
            NodeRole::Saver => "9",
        }
    }

    /// Service-side node class.
    pub fn class_type(self) -> &'static str {
        match self {
            NodeRole::Sampler => "KSampler",
            NodeRole::Checkpoint => "CheckpointLoaderSimple",
            NodeRole::LatentImage => "EmptyLatentImage",
            NodeRole::PositivePrompt | NodeRole::NegativePrompt => "CLIPTextEncode",
            NodeRole::Decoder => "VAEDecode",
            NodeRole::Saver => "SaveImage",
        }
    }

    fn output(self, index: u32) -> NodeRef {
        NodeRef::new(self.id(), index)
    }
}

/// Fixed sampler settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    pub steps: u32,
    pub cfg: f64,
    pub sampler_name: String,
    pub scheduler: String,
    pub denoise: f64,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            steps: 30,
            cfg: 7.5,
            sampler_name: "euler_ancestral".to_string(),
            scheduler: "normal".to_string(),
            denoise: 1.0,
        }
    }
}

/// Builds [`WorkflowGraph`]s for prompts.
#[derive(Debug, Clone)]
pub struct WorkflowBuilder {
    checkpoint: String,
    width: u32,
    height: u32,
    batch_size: u32,
    sampling: SamplingParams,
    negative_prompt: String,
    filename_prefix: String,
}

impl Default for WorkflowBuilder {
    fn default() -> Self {
        Self {
            checkpoint: "sd_xl_base_1.0.safetensors".to_string(),
            width: 512,
            height: 512,
            batch_size: 1,
            sampling: SamplingParams::default(),
            negative_prompt: NEGATIVE_PROMPT.to_string(),
            filename_prefix: "FS_".to_string(),
        }
    }
}

impl WorkflowBuilder {
    pub fn new(checkpoint: impl Into<String>) -> Self {
        Self {
            checkpoint: checkpoint.into(),
            ..Self::default()
        }
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_sampling(mut self, sampling: SamplingParams) -> Self {
        self.sampling = sampling;
        self
    }

    pub fn with_filename_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.filename_prefix = prefix.into();
        self
    }

    pub fn checkpoint(&self) -> &str {
        &self.checkpoint
    }

    pub fn batch_size(&self) -> u32 {
        self.batch_size
    }

    /// Builds a graph for `prompt` with a fresh random seed.
    pub fn build(&self, prompt: &str) -> WorkflowGraph {
        let seed = rand::rng().random_range(0..MAX_SEED);
        self.build_with_seed(prompt, seed)
    }

    /// Builds a graph for `prompt` with an explicit seed.
    pub fn build_with_seed(&self, prompt: &str, seed: u64) -> WorkflowGraph {
        let mut graph = WorkflowGraph::new();
        let sampling = &self.sampling;

        graph.insert(
            NodeRole::Checkpoint.id(),
            WorkflowNode::new(NodeRole::Checkpoint.class_type())
                .input("ckpt_name", self.checkpoint.as_str()),
        );
        graph.insert(
            NodeRole::LatentImage.id(),
            WorkflowNode::new(NodeRole::LatentImage.class_type())
                .input("width", self.width)
                .input("height", self.height)
                .input("batch_size", self.batch_size),
        );
        graph.insert(
            NodeRole::PositivePrompt.id(),
            WorkflowNode::new(NodeRole::PositivePrompt.class_type())
                .input("text", prompt)
                .input("clip", NodeRole::Checkpoint.output(1)),
        );
        graph.insert(
            NodeRole::NegativePrompt.id(),
            WorkflowNode::new(NodeRole::NegativePrompt.class_type())
                .input("text", self.negative_prompt.as_str())
                .input("clip", NodeRole::Checkpoint.output(1)),
        );
        graph.insert(
            NodeRole::Sampler.id(),
            WorkflowNode::new(NodeRole::Sampler.class_type())
                .input("seed", seed.min(MAX_SEED - 1) as i64)
                .input("steps", sampling.steps)
                .input("cfg", sampling.cfg)
                .input("sampler_name", sampling.sampler_name.as_str())
                .input("scheduler", sampling.scheduler.as_str())
                .input("denoise", sampling.denoise)
                .input("model", NodeRole::Checkpoint.output(0))
                .input("positive", NodeRole::PositivePrompt.output(0))
                .input("negative", NodeRole::NegativePrompt.output(0))
                .input("latent_image", NodeRole::LatentImage.output(0)),
        );
        graph.insert(
            NodeRole::Decoder.id(),
            WorkflowNode::new(NodeRole::Decoder.class_type())
                .input("samples", NodeRole::Sampler.output(0))
                .input("vae", NodeRole::Checkpoint.output(2)),
        );
        graph.insert(
            NodeRole::Saver.id(),
            WorkflowNode::new(NodeRole::Saver.class_type())
                .input("filename_prefix", self.filename_prefix.as_str())
                .input("images", NodeRole::Decoder.output(0)),
        );

        graph
    }
}

/// Reads the seed back out of a built graph.
pub fn seed_of(graph: &WorkflowGraph) -> Option<u64> {
    graph
        .node(NodeRole::Sampler.id())?
        .get("seed")?
        .as_int()
        .and_then(|seed| u64::try_from(seed).ok())
}

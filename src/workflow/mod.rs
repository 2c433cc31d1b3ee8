//! Job-graph construction for the image-generation service.

pub mod builder;
pub mod graph;

pub use builder::{seed_of, NodeRole, SamplingParams, WorkflowBuilder, NEGATIVE_PROMPT};
pub use graph::{GraphError, InputValue, NodeRef, WorkflowGraph, WorkflowNode};

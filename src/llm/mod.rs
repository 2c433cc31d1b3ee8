//! Text-generation integration.
//!
//! Talks to a local text-generation service to turn sampled scenarios into
//! image-generation prompts. The service may answer with one JSON object or a
//! stream of newline-delimited fragments; see [`stream`].
//!
//! ```ignore
//! use smoke_forge::llm::{PromptSynthesizer, TextGenClient};
//! use std::sync::Arc;
//!
//! let client = TextGenClient::new(
//!     "http://localhost:11434/api/generate",
//!     "llama3.1",
//!     0.7,
//!     std::time::Duration::from_secs(120),
//! )?;
//! let synthesizer = PromptSynthesizer::new(Arc::new(client));
//! let prompt = synthesizer.synthesize(&subject).await;
//! ```

pub mod client;
pub mod stream;
pub mod synthesizer;

pub use client::{ApiFlavor, Message, TextGenClient, TextGenerator, DEFAULT_LLM_TIMEOUT};
pub use stream::{collect_fragments, Fragment, FragmentChunks, MalformedLinePolicy};
pub use synthesizer::{instruction_for, PromptSynthesizer, SynthesizedPrompt, SYSTEM_INSTRUCTION};

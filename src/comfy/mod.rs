//! Image-generation service integration.
//!
//! This module submits job graphs to a ComfyUI-compatible service, waits for
//! them to finish and downloads the produced images:
//!
//! - [`client`]: the [`ImageBackend`] trait and its HTTP/websocket implementation
//! - [`events`]: push-event decoding and per-job completion tracking
//! - [`history`]: history-record parsing and artifact extraction
//! - [`orchestrator`]: the submit / await / fetch state machine
//!
//! ```ignore
//! use smoke_forge::comfy::{ComfyClient, JobOrchestrator, OrchestratorConfig};
//! use std::sync::Arc;
//!
//! let backend = ComfyClient::new("http://127.0.0.1:8188", "ws://127.0.0.1:8188/ws", timeout)?;
//! let orchestrator = JobOrchestrator::new(Arc::new(backend), OrchestratorConfig::default());
//! let report = orchestrator.run_job(&workflow).await;
//! ```

pub mod client;
pub mod events;
pub mod history;
pub mod orchestrator;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use client::{ComfyClient, ImageBackend, DEFAULT_HTTP_TIMEOUT};
pub use events::{EventStream, JobWatch, PushEvent, PushVerdict};
pub use history::{ArtifactRef, HistoryRecord, HistoryState};
pub use orchestrator::{
    AwaitOutcome, FetchFailure, FetchReport, JobOrchestrator, JobReport, JobState,
    OrchestratorConfig, SignalSource,
};

/// Opaque job identifier (`prompt_id`) assigned by the image service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The id with anything outside `[A-Za-z0-9_-]` replaced, for use in file names.
    pub fn file_stem(&self) -> String {
        self.0
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect()
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

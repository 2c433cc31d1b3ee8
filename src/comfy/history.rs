//! History records returned by `GET /history/{prompt_id}`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One produced file, as listed in a node's outputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    /// Storage bucket on the service side (`output`, `temp`, ...).
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl ArtifactRef {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            subfolder: String::new(),
            kind: None,
        }
    }

    /// Extension of the service-side filename, `png` if it has none.
    pub fn extension(&self) -> &str {
        std::path::Path::new(&self.filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| !ext.is_empty())
            .unwrap_or("png")
    }
}

/// Outputs of a single node. Only images are of interest.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeOutput {
    #[serde(default)]
    pub images: Vec<ArtifactRef>,
}

/// Execution status block of a history record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryStatus {
    #[serde(default)]
    pub status_str: Option<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub messages: Vec<serde_json::Value>,
}

/// Where a job stands according to its history record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryState {
    Pending,
    Completed,
    Failed(String),
}

/// A job's history record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryRecord {
    #[serde(default)]
    pub status: Option<HistoryStatus>,
    #[serde(default)]
    pub outputs: BTreeMap<String, NodeOutput>,
}

impl HistoryRecord {
    /// Classifies the record.
    ///
    /// A record without a status block counts as completed once it has outputs.
    pub fn state(&self) -> HistoryState {
        match &self.status {
            Some(status) if status.status_str.as_deref() == Some("error") => {
                HistoryState::Failed(error_message(&status.messages))
            }
            Some(status) if status.completed => HistoryState::Completed,
            Some(_) => HistoryState::Pending,
            None if !self.outputs.is_empty() => HistoryState::Completed,
            None => HistoryState::Pending,
        }
    }

    /// Every image listed by any node, in node-id order.
    pub fn artifacts(&self) -> Vec<ArtifactRef> {
        self.outputs
            .values()
            .flat_map(|output| output.images.iter().cloned())
            .collect()
    }
}

/// Pulls the record for `prompt_id` out of a `/history/{id}` response body.
///
/// The service answers `{}` while the job is still queued or running.
pub fn record_for(
    mut body: BTreeMap<String, HistoryRecord>,
    prompt_id: &str,
) -> Option<HistoryRecord> {
    body.remove(prompt_id)
}

// Status messages look like ["execution_error", {"exception_message": "..."}].
fn error_message(messages: &[serde_json::Value]) -> String {
    messages
        .iter()
        .filter_map(|m| m.as_array())
        .filter(|pair| pair.first().and_then(|k| k.as_str()) == Some("execution_error"))
        .filter_map(|pair| pair.get(1)?.get("exception_message")?.as_str())
        .next()
        .unwrap_or("execution failed")
        .to_string()
}

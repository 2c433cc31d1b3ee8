//! Read-modify-write appends to the dataset log.
//!
//! The log is a single pretty-printed JSON array. Every append reads the whole
//! array, pushes one record and rewrites the file, so only one writer may use a
//! log at a time. A log that fails to parse is replaced by an empty array
//! before appending; its previous contents are lost.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, error};

use super::record::ArtifactRecord;
use crate::error::RecorderError;

/// What happened during an append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendOutcome {
    /// Records in the log after the append.
    pub total: usize,
    /// True if an unreadable log was discarded first.
    pub reset_corrupt_log: bool,
}

/// Appends [`ArtifactRecord`]s to a JSON array file.
#[derive(Debug, Clone)]
pub struct DatasetRecorder {
    path: PathBuf,
}

impl DatasetRecorder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the log strictly: a missing file is empty, a corrupt one is an error.
    pub async fn load(&self) -> Result<Vec<ArtifactRecord>, RecorderError> {
        match fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Appends one record.
    pub async fn append(&self, record: &ArtifactRecord) -> Result<AppendOutcome, RecorderError> {
        let mut reset_corrupt_log = false;
        let mut records: Vec<serde_json::Value> = match fs::read(&self.path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(records) => records,
                Err(e) => {
                    error!(
                        path = %self.path.display(),
                        error = %e,
                        "Dataset log is not a valid JSON array; starting a new one, previous entries are lost"
                    );
                    reset_corrupt_log = true;
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        records.push(serde_json::to_value(record)?);

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&self.path, serde_json::to_vec_pretty(&records)?).await?;

        debug!(path = %self.path.display(), total = records.len(), "Appended dataset record");
        Ok(AppendOutcome {
            total: records.len(),
            reset_corrupt_log,
        })
    }
}

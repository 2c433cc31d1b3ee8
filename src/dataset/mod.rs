//! Dataset log: one JSON array of [`ArtifactRecord`]s on disk.

pub mod record;
pub mod recorder;

pub use record::ArtifactRecord;
pub use recorder::{AppendOutcome, DatasetRecorder};

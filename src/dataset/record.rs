//! Metadata record stored for every saved image.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::comfy::JobHandle;
use crate::scenario::PromptSubject;

/// One entry of the dataset log. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub timestamp: DateTime<Utc>,
    pub prompt: String,
    pub metadata: PromptSubject,
    pub image_path: String,
    pub prompt_id: String,
}

impl ArtifactRecord {
    /// Creates a record stamped with the current time.
    pub fn new(prompt: impl Into<String>, metadata: PromptSubject, image_path: &Path, prompt_id: &JobHandle) -> Self {
        Self {
            timestamp: Utc::now(),
            prompt: prompt.into(),
            metadata,
            image_path: image_path.to_string_lossy().into_owned(),
            prompt_id: prompt_id.as_str().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::ScenarioDescriptor;

    #[test]
    fn test_record_json_shape() {
        let subject = PromptSubject::from(ScenarioDescriptor {
            environment: "farmland".to_string(),
            time_weather: "windy day".to_string(),
            fire_stage: "visible smoke with small flames starting to spread".to_string(),
            pov: "from road perspective".to_string(),
        });
        let record = ArtifactRecord::new(
            "A wheat field...",
            subject,
            Path::new("fs_dataset/abc_0.png"),
            &JobHandle::new("abc"),
        );
        let json = serde_json::to_value(&record).unwrap();

        let keys: Vec<&str> = json.as_object().unwrap().keys().map(String::as_str).collect();
        for key in ["timestamp", "prompt", "metadata", "image_path", "prompt_id"] {
            assert!(keys.contains(&key), "missing {}", key);
        }
        assert_eq!(json["metadata"]["pov"], "from road perspective");
        assert_eq!(json["image_path"], "fs_dataset/abc_0.png");
        assert_eq!(json["prompt_id"], "abc");

        let back: ArtifactRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}

//! Scenario sampling for synthetic fire/smoke imagery.
//!
//! A scenario is one combination of environment, time/weather, fire stage and
//! camera viewpoint. Each batch iteration draws a fresh one (or, in custom
//! mode, uses a free-text topic instead) and the result is embedded verbatim
//! into the dataset record.

pub mod sampler;
pub mod vocabulary;

use serde::{Deserialize, Serialize};

pub use sampler::ScenarioSampler;
pub use vocabulary::Vocabulary;

/// One sampled scenario. Immutable once drawn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioDescriptor {
    pub environment: String,
    pub time_weather: String,
    pub fire_stage: String,
    pub pov: String,
}

/// What a prompt is written about.
///
/// Serialized untagged so an auto-mode record carries the four descriptor
/// fields directly and a custom-mode record carries `{"topic": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PromptSubject {
    Scenario(ScenarioDescriptor),
    Topic { topic: String },
}

impl PromptSubject {
    /// Creates a free-text topic subject.
    pub fn topic(topic: impl Into<String>) -> Self {
        Self::Topic {
            topic: topic.into(),
        }
    }

    /// Returns the scenario if this subject was sampled.
    pub fn scenario(&self) -> Option<&ScenarioDescriptor> {
        match self {
            Self::Scenario(scenario) => Some(scenario),
            Self::Topic { .. } => None,
        }
    }
}

impl From<ScenarioDescriptor> for PromptSubject {
    fn from(scenario: ScenarioDescriptor) -> Self {
        Self::Scenario(scenario)
    }
}

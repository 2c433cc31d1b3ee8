//! Prompt synthesis: scenario in, image-generation prompt out.

use std::sync::Arc;

use tracing::{debug, warn};

use super::client::TextGenerator;
use crate::error::LlmError;
use crate::scenario::{PromptSubject, ScenarioDescriptor};

/// Style instruction shared by both modes.
pub const SYSTEM_INSTRUCTION: &str = r#"
You are an expert at creating detailed prompts
for AI image generation. Create realistic, detailed
prompt generating an image of smoke/fire detection
scenarios.

Focus on early detection stages where smoke or initial
flames are just becoming visible. Make your prompts photorealistic
and detailed.
"#;

const SCENARIO_TEMPLATE: &str = r#"
Create a single detailed image generation prompt for a scenario
with:
    - Environment: {environment}
    - Conditions: {time_weather}
    - Fire/smoke stage: {fire_stage}
    - Camera perspective: {pov}

Focus on photorealism and detail. Return ONLY the prompt text with
no explanations or additional text.
"#;

const TOPIC_TEMPLATE: &str = r#"
Create a single detailed image generation prompt about:
    {topic}

Focus on photorealism and detail. Return ONLY the prompt text with
no explanations or additional text.
"#;

/// A generated prompt paired with what it was generated from.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedPrompt {
    pub text: String,
    pub subject: PromptSubject,
}

/// Builds the full instruction sent for `subject`.
pub fn instruction_for(subject: &PromptSubject) -> String {
    let user_message = match subject {
        PromptSubject::Scenario(ScenarioDescriptor {
            environment,
            time_weather,
            fire_stage,
            pov,
        }) => SCENARIO_TEMPLATE
            .replace("{environment}", environment)
            .replace("{time_weather}", time_weather)
            .replace("{fire_stage}", fire_stage)
            .replace("{pov}", pov),
        PromptSubject::Topic { topic } => TOPIC_TEMPLATE.replace("{topic}", topic),
    };
    format!("{}\n\n{}", SYSTEM_INSTRUCTION, user_message)
}

/// Turns subjects into prompts through a [`TextGenerator`].
pub struct PromptSynthesizer {
    generator: Arc<dyn TextGenerator>,
}

impl PromptSynthesizer {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Generates a prompt, surfacing the failure reason.
    pub async fn try_synthesize(&self, subject: &PromptSubject) -> Result<SynthesizedPrompt, LlmError> {
        let instruction = instruction_for(subject);
        let text = self.generator.complete(&instruction).await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        debug!(chars = text.len(), "Synthesized prompt");
        Ok(SynthesizedPrompt {
            text: text.to_string(),
            subject: subject.clone(),
        })
    }

    /// Generates a prompt; any failure is logged and yields `None`.
    pub async fn synthesize(&self, subject: &PromptSubject) -> Option<SynthesizedPrompt> {
        match self.try_synthesize(subject).await {
            Ok(prompt) => Some(prompt),
            Err(e) => {
                warn!(error = %e, "Prompt synthesis failed");
                None
            }
        }
    }
}

//! HTTP client for the local text-generation service.
//!
//! Two request shapes are supported, chosen from the endpoint URL:
//! - `/api/generate` style: `{model, prompt, temperature}` answered with
//!   newline-delimited JSON fragments
//! - `/v1/chat/completions` style: `{model, messages, temperature}` answered
//!   with a single OpenAI-compatible object

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::stream::{collect_fragments, MalformedLinePolicy};
use crate::error::LlmError;

/// Default timeout for text-generation requests.
pub const DEFAULT_LLM_TIMEOUT: Duration = Duration::from_secs(120);

/// Trait for services that turn an instruction into text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Sends `prompt` and returns the complete generated text.
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Request/response shape spoken by an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiFlavor {
    /// Streaming `/api/generate` endpoint.
    Generate,
    /// OpenAI-compatible `/v1/chat/completions` endpoint.
    ChatCompletions,
}

impl ApiFlavor {
    /// Picks the flavor an endpoint URL implies.
    pub fn detect(endpoint: &str) -> Self {
        if endpoint.contains("/v1/") {
            ApiFlavor::ChatCompletions
        } else {
            ApiFlavor::Generate
        }
    }
}

/// A chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Message,
}

/// Client for a local text-generation endpoint.
pub struct TextGenClient {
    endpoint: String,
    model: String,
    temperature: f64,
    flavor: ApiFlavor,
    malformed_lines: MalformedLinePolicy,
    http_client: Client,
}

impl TextGenClient {
    /// Creates a client for `endpoint` (a full URL, e.g.
    /// `http://localhost:11434/api/generate`).
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        temperature: f64,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let endpoint = endpoint.into();
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::RequestFailed(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            flavor: ApiFlavor::detect(&endpoint),
            endpoint,
            model: model.into(),
            temperature,
            malformed_lines: MalformedLinePolicy::default(),
            http_client,
        })
    }

    /// Sets how malformed fragment lines are handled.
    pub fn with_malformed_line_policy(mut self, policy: MalformedLinePolicy) -> Self {
        self.malformed_lines = policy;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn flavor(&self) -> ApiFlavor {
        self.flavor
    }

    async fn post_json<T: Serialize + ?Sized>(&self, body: &T) -> Result<String, LlmError> {
        let response = self
            .http_client
            .post(&self.endpoint)
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| LlmError::RequestFailed(format!("failed to read response body: {}", e)))?;

        if !status.is_success() {
            return Err(LlmError::ApiError {
                code: status.as_u16(),
                message: text,
            });
        }
        Ok(text)
    }
}

#[async_trait]
impl TextGenerator for TextGenClient {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        match self.flavor {
            ApiFlavor::Generate => {
                let request = GenerateRequest {
                    model: &self.model,
                    prompt,
                    temperature: self.temperature,
                };
                let body = self.post_json(&request).await?;
                collect_fragments(&body, self.malformed_lines)
            }
            ApiFlavor::ChatCompletions => {
                let request = ChatRequest {
                    model: &self.model,
                    messages: vec![Message::user(prompt)],
                    temperature: self.temperature,
                };
                let body = self.post_json(&request).await?;
                let parsed: ChatResponse = serde_json::from_str(&body)
                    .map_err(|e| LlmError::ParseError(format!("Failed to parse API response: {}", e)))?;
                parsed
                    .choices
                    .into_iter()
                    .next()
                    .map(|choice| choice.message.content)
                    .ok_or_else(|| LlmError::ParseError("No content in LLM response".to_string()))
            }
        }
    }
}

//! HTTP/websocket client for the image-generation service.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::events::{self, EventStream};
use super::history::{record_for, ArtifactRef, HistoryRecord};
use super::JobHandle;
use crate::error::ComfyError;
use crate::workflow::WorkflowGraph;

/// Default timeout for a single HTTP call to the image service.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// Operations the orchestrator needs from an image-generation service.
#[async_trait]
pub trait ImageBackend: Send + Sync {
    /// Queues a workflow; events for it are routed to `client_id`.
    async fn submit(&self, workflow: &WorkflowGraph, client_id: &str) -> Result<JobHandle, ComfyError>;

    /// Fetches the history record of a job, `None` if the service has none yet.
    async fn history(&self, handle: &JobHandle) -> Result<Option<HistoryRecord>, ComfyError>;

    /// Downloads the bytes of one artifact.
    async fn view(&self, artifact: &ArtifactRef) -> Result<Vec<u8>, ComfyError>;

    /// Opens the push event channel for `client_id`.
    async fn open_events(&self, client_id: &str) -> Result<EventStream, ComfyError>;
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(default)]
    prompt_id: Option<String>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// Client for a ComfyUI-compatible service.
pub struct ComfyClient {
    api_base: String,
    ws_url: String,
    http_client: Client,
    connect_timeout: Duration,
}

impl ComfyClient {
    /// Creates a client.
    ///
    /// # Arguments
    ///
    /// * `api_base` - HTTP base URL, e.g. `http://127.0.0.1:8188`
    /// * `ws_url` - Event socket URL, e.g. `ws://127.0.0.1:8188/ws`
    /// * `timeout` - Per-request HTTP timeout
    pub fn new(
        api_base: impl Into<String>,
        ws_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ComfyError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ComfyError::RequestFailed(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            ws_url: ws_url.into(),
            http_client,
            connect_timeout: timeout,
        })
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    /// URL of the `/view` endpoint for `artifact`.
    pub fn view_url(&self, artifact: &ArtifactRef) -> String {
        let mut url = format!(
            "{}?filename={}&subfolder={}",
            self.url("/view"),
            urlencoding::encode(&artifact.filename),
            urlencoding::encode(&artifact.subfolder)
        );
        if let Some(kind) = &artifact.kind {
            url.push_str("&type=");
            url.push_str(&urlencoding::encode(kind));
        }
        url
    }

    /// Event socket URL with the client id attached.
    pub fn events_url(&self, client_id: &str) -> String {
        let separator = if self.ws_url.contains('?') { '&' } else { '?' };
        format!(
            "{}{}clientId={}",
            self.ws_url,
            separator,
            urlencoding::encode(client_id)
        )
    }

    async fn checked(response: reqwest::Response) -> Result<reqwest::Response, ComfyError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read error response".to_string());
        Err(ComfyError::ApiError {
            code: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl ImageBackend for ComfyClient {
    async fn submit(&self, workflow: &WorkflowGraph, client_id: &str) -> Result<JobHandle, ComfyError> {
        let response = self
            .http_client
            .post(self.url("/prompt"))
            .json(&workflow.to_submission(client_id))
            .send()
            .await
            .map_err(|e| ComfyError::RequestFailed(e.to_string()))?;
        let response = Self::checked(response).await?;

        let body: SubmitResponse = response
            .json()
            .await
            .map_err(|e| ComfyError::ParseError(format!("Failed to parse submit response: {}", e)))?;

        if let Some(error) = body.error {
            return Err(ComfyError::Rejected(error.to_string()));
        }
        match body.prompt_id {
            Some(id) if !id.is_empty() => Ok(JobHandle::new(id)),
            _ => Err(ComfyError::MissingPromptId),
        }
    }

    async fn history(&self, handle: &JobHandle) -> Result<Option<HistoryRecord>, ComfyError> {
        let url = self.url(&format!("/history/{}", urlencoding::encode(handle.as_str())));
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| ComfyError::RequestFailed(e.to_string()))?;
        let response = Self::checked(response).await?;

        let body: BTreeMap<String, HistoryRecord> = response
            .json()
            .await
            .map_err(|e| ComfyError::ParseError(format!("Failed to parse history: {}", e)))?;
        Ok(record_for(body, handle.as_str()))
    }

    async fn view(&self, artifact: &ArtifactRef) -> Result<Vec<u8>, ComfyError> {
        let response = self
            .http_client
            .get(self.view_url(artifact))
            .send()
            .await
            .map_err(|e| ComfyError::RequestFailed(e.to_string()))?;
        let response = Self::checked(response).await?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ComfyError::RequestFailed(format!("failed to read image bytes: {}", e)))?;
        Ok(bytes.to_vec())
    }

    async fn open_events(&self, client_id: &str) -> Result<EventStream, ComfyError> {
        events::connect(&self.events_url(client_id), self.connect_timeout).await
    }
}

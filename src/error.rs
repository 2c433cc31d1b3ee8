//! Error types for smoke-forge operations.
//!
//! Defines error types for each external boundary:
//! - Text-generation service calls
//! - Image-generation service calls (submit, history, view, event socket)
//! - Dataset log persistence
//!
//! None of these are fatal to a batch run; the pipeline turns them into
//! skipped iterations.

use thiserror::Error;

/// Errors that can occur during text-generation (LLM) calls.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Malformed response fragment on line {line}: {message}")]
    MalformedFragment { line: usize, message: String },

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("LLM returned an empty prompt")]
    EmptyResponse,
}

/// Errors that can occur while talking to the image-generation service.
#[derive(Debug, Error)]
pub enum ComfyError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Image service error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("Failed to parse image service response: {0}")]
    ParseError(String),

    #[error("Submission response carried no prompt_id")]
    MissingPromptId,

    #[error("Workflow rejected by image service: {0}")]
    Rejected(String),

    #[error("Event channel error: {0}")]
    EventChannel(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while persisting the dataset log.
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

//! Push events from the image service's websocket.
//!
//! Every text frame is a JSON object `{"type": ..., "data": {...}}`. Binary
//! frames carry preview images and are dropped.

use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;

use crate::error::ComfyError;

/// Stream of decoded push events. Ends when the socket closes.
pub type EventStream = BoxStream<'static, Result<PushEvent, ComfyError>>;

/// Decoded push event.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    /// Queue status broadcast.
    Status { queue_remaining: Option<u64> },
    ExecutionStart { prompt_id: String },
    /// A node started running; `node: None` means the job finished.
    Executing {
        prompt_id: Option<String>,
        node: Option<String>,
    },
    Progress {
        prompt_id: Option<String>,
        value: u64,
        max: u64,
    },
    /// An output node finished.
    Executed {
        prompt_id: Option<String>,
        node: Option<String>,
    },
    /// The job finished successfully (`execution_success` / `execution_complete`).
    ExecutionSuccess { prompt_id: String },
    ExecutionError {
        prompt_id: String,
        message: String,
    },
    ExecutionInterrupted { prompt_id: String },
    Other { kind: String },
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

fn str_field(data: &Value, key: &str) -> Option<String> {
    data.get(key).and_then(Value::as_str).map(str::to_string)
}

impl PushEvent {
    /// Decodes one text frame.
    pub fn parse(text: &str) -> Result<Self, ComfyError> {
        let raw: RawEvent = serde_json::from_str(text)
            .map_err(|e| ComfyError::ParseError(format!("bad push event: {}", e)))?;
        let data = &raw.data;
        let prompt_id = str_field(data, "prompt_id");

        let event = match raw.kind.as_str() {
            "status" => PushEvent::Status {
                queue_remaining: data
                    .pointer("/status/exec_info/queue_remaining")
                    .and_then(Value::as_u64),
            },
            "execution_start" => match prompt_id {
                Some(prompt_id) => PushEvent::ExecutionStart { prompt_id },
                None => PushEvent::Other { kind: raw.kind },
            },
            "executing" => PushEvent::Executing {
                prompt_id,
                node: str_field(data, "node"),
            },
            "progress" => PushEvent::Progress {
                prompt_id,
                value: data.get("value").and_then(Value::as_u64).unwrap_or(0),
                max: data.get("max").and_then(Value::as_u64).unwrap_or(0),
            },
            "executed" => PushEvent::Executed {
                prompt_id,
                node: str_field(data, "node"),
            },
            "execution_success" | "execution_complete" => match prompt_id {
                Some(prompt_id) => PushEvent::ExecutionSuccess { prompt_id },
                None => PushEvent::Other { kind: raw.kind },
            },
            "execution_error" => match prompt_id {
                Some(prompt_id) => PushEvent::ExecutionError {
                    prompt_id,
                    message: str_field(data, "exception_message")
                        .unwrap_or_else(|| "execution error".to_string()),
                },
                None => PushEvent::Other { kind: raw.kind },
            },
            "execution_interrupted" => match prompt_id {
                Some(prompt_id) => PushEvent::ExecutionInterrupted { prompt_id },
                None => PushEvent::Other { kind: raw.kind },
            },
            _ => PushEvent::Other { kind: raw.kind },
        };
        Ok(event)
    }
}

/// What the push channel concluded about a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushVerdict {
    Completed,
    Failed(String),
}

/// Tracks the events of one job and decides when it is over.
#[derive(Debug, Clone)]
pub struct JobWatch {
    prompt_id: String,
    seen_running: bool,
}

impl JobWatch {
    pub fn new(prompt_id: impl Into<String>) -> Self {
        Self {
            prompt_id: prompt_id.into(),
            seen_running: false,
        }
    }

    fn is_ours(&self, prompt_id: Option<&str>) -> bool {
        prompt_id == Some(self.prompt_id.as_str())
    }

    /// Feeds one event; returns a verdict once the job is known to be over.
    pub fn observe(&mut self, event: &PushEvent) -> Option<PushVerdict> {
        match event {
            PushEvent::ExecutionStart { prompt_id } if self.is_ours(Some(prompt_id)) => {
                self.seen_running = true;
                None
            }
            PushEvent::Executing { prompt_id, node } if self.is_ours(prompt_id.as_deref()) => {
                if node.is_none() {
                    return Some(PushVerdict::Completed);
                }
                self.seen_running = true;
                None
            }
            PushEvent::Progress { prompt_id, .. } | PushEvent::Executed { prompt_id, .. }
                if self.is_ours(prompt_id.as_deref()) =>
            {
                self.seen_running = true;
                None
            }
            PushEvent::ExecutionSuccess { prompt_id } if self.is_ours(Some(prompt_id)) => {
                Some(PushVerdict::Completed)
            }
            PushEvent::ExecutionError { prompt_id, message } if self.is_ours(Some(prompt_id)) => {
                Some(PushVerdict::Failed(message.clone()))
            }
            PushEvent::ExecutionInterrupted { prompt_id } if self.is_ours(Some(prompt_id)) => {
                Some(PushVerdict::Failed("execution interrupted".to_string()))
            }
            // An empty queue after our job ran means it is done.
            PushEvent::Status {
                queue_remaining: Some(0),
            } if self.seen_running => Some(PushVerdict::Completed),
            _ => None,
        }
    }
}

/// Opens the event socket at `url` and decodes its frames.
pub async fn connect(url: &str, connect_timeout: Duration) -> Result<EventStream, ComfyError> {
    let (socket, _response) = tokio::time::timeout(connect_timeout, tokio_tungstenite::connect_async(url))
        .await
        .map_err(|_| ComfyError::EventChannel(format!("timed out connecting to {}", url)))?
        .map_err(|e| ComfyError::EventChannel(e.to_string()))?;

    let events = socket
        .take_while(|frame| futures::future::ready(!matches!(frame, Ok(Message::Close(_)))))
        .filter_map(|frame| async move {
            match frame {
                Ok(Message::Text(text)) => Some(PushEvent::parse(text.as_str())),
                Ok(_) => None,
                Err(e) => Some(Err(ComfyError::EventChannel(e.to_string()))),
            }
        });

    Ok(events.boxed())
}

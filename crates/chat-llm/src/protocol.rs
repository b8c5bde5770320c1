//! Wire types for the chat-completion API.
//!
//! Request bodies serialize [`chat_core::ContextEntry`] values as-is, so the
//! context builder's output goes onto the wire untouched.

use std::pin::Pin;

use futures::Stream;
use serde::{Deserialize, Serialize};

use chat_core::ContextEntry;

use crate::error::Result;

/// Per-request model parameters supplied by the conversation settings.
#[derive(Debug, Clone)]
pub struct ModelParams {
    pub model: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    /// Ask the API for a JSON object response.
    pub json_mode: bool,
}

impl ModelParams {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            max_tokens: None,
            temperature: None,
            json_mode: false,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_json_mode(mut self) -> Self {
        self.json_mode = true;
        self
    }
}

#[derive(Debug, Serialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub format_type: &'static str,
}

impl ResponseFormat {
    pub fn json_object() -> Self {
        Self {
            format_type: "json_object",
        }
    }
}

/// Request body for `POST /chat/completions`.
#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ContextEntry],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

impl<'a> ChatRequest<'a> {
    pub fn new(messages: &'a [ContextEntry], params: &'a ModelParams, stream: bool) -> Self {
        Self {
            model: &params.model,
            messages,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            stream: stream.then_some(true),
            response_format: params.json_mode.then(ResponseFormat::json_object),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    pub id: Option<String>,
    pub model: Option<String>,
    pub choices: Vec<Choice>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChoiceMessage {
    pub content: Option<String>,
}

/// One parsed SSE `data:` payload.
#[derive(Debug, Deserialize)]
pub struct StreamChunk {
    #[serde(default)]
    pub choices: Vec<StreamChoice>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
pub struct StreamChoice {
    #[serde(default)]
    pub delta: Delta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Delta {
    pub content: Option<String>,
}

/// Final result of a blocking completion call.
#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    pub usage: Usage,
    pub finish_reason: Option<String>,
    pub latency_ms: u64,
}

/// Incremental streaming output, in transport order.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Token text to append.
    Token(String),
    /// Stream end: either the `[DONE]` sentinel or a `finish_reason`.
    Done {
        finish_reason: Option<String>,
        usage: Option<Usage>,
    },
}

pub type TokenStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

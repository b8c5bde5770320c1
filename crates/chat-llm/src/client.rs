use std::time::Instant;

use reqwest::header::RETRY_AFTER;
use reqwest::{Response, StatusCode};
use tokio_util::sync::CancellationToken;

use chat_core::{ContextEntry, PartialTranscript};

use crate::config::ClientConfig;
use crate::error::{LlmError, Result};
use crate::protocol::{ChatRequest, ChatResponse, Completion, ModelParams, TokenStream};
use crate::retry::{backoff_delay, DEFAULT_MAX_ATTEMPTS};
use crate::sse;

/// HTTP client for the chat-completion API.
pub struct ChatClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    max_attempts: u32,
}

impl ChatClient {
    /// Build from configuration. A missing credential fails here, before any
    /// network attempt.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| LlmError::Config("no API key configured".to_string()))?;

        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self {
            http,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_attempts: config.max_attempts.max(1),
        })
    }

    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: crate::config::DEFAULT_BASE_URL.to_string(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Blocking completion call.
    ///
    /// Honors `cancel` cooperatively: a cancellation while the request is in
    /// flight aborts it and surfaces [`LlmError::Cancelled`] (with empty
    /// partial text, since nothing streams in sync mode).
    pub async fn send(
        &self,
        entries: &[ContextEntry],
        params: &ModelParams,
        cancel: &CancellationToken,
    ) -> Result<Completion> {
        validate(entries, params)?;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(LlmError::Cancelled {
                partial: String::new(),
            }),
            result = self.request_completion(entries, params) => result,
        }
    }

    /// Streaming completion call.
    ///
    /// The retry policy only covers establishing the response; once frames
    /// are flowing, failures surface immediately through the stream. Every
    /// emitted token is appended to `transcript` before delivery so
    /// cancellation can recover it.
    pub async fn stream(
        &self,
        entries: &[ContextEntry],
        params: &ModelParams,
        cancel: CancellationToken,
        transcript: PartialTranscript,
    ) -> Result<TokenStream> {
        validate(entries, params)?;

        let body = ChatRequest::new(entries, params, true);
        // The token is honored while the response is still being
        // established, so a timeout firing mid-connect aborts the call too.
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(LlmError::Cancelled {
                    partial: transcript.snapshot(),
                })
            }
            result = self.post_with_retry(&body) => result?,
        };
        Ok(sse::token_stream(response, cancel, transcript))
    }

    async fn request_completion(
        &self,
        entries: &[ContextEntry],
        params: &ModelParams,
    ) -> Result<Completion> {
        let body = ChatRequest::new(entries, params, false);
        let started = Instant::now();
        let response = self.post_with_retry(&body).await?;
        let latency_ms = started.elapsed().as_millis() as u64;

        let parsed: ChatResponse = response.json().await?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::Protocol("response contained no choices".to_string()))?;

        Ok(Completion {
            content: choice.message.content.unwrap_or_default(),
            usage: parsed.usage.unwrap_or_default(),
            finish_reason: choice.finish_reason,
            latency_ms,
        })
    }

    /// POST with exponential backoff on transient failures (timeouts, 5xx).
    /// All other error classes return on first occurrence.
    async fn post_with_retry(&self, body: &ChatRequest<'_>) -> Result<Response> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut attempt = 0u32;
        loop {
            let outcome = self
                .http
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(body)
                .send()
                .await;

            let error = match outcome {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => classify_response(response).await,
                Err(error) if error.is_timeout() || error.is_connect() => {
                    LlmError::Timeout(error.to_string())
                }
                Err(error) => LlmError::Http(error),
            };

            if !error.is_retryable() || attempt + 1 >= self.max_attempts {
                return Err(error);
            }

            let delay = backoff_delay(attempt);
            log::warn!(
                "attempt {}/{} failed ({}); retrying in {:?}",
                attempt + 1,
                self.max_attempts,
                error,
                delay
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

fn validate(entries: &[ContextEntry], params: &ModelParams) -> Result<()> {
    if entries.is_empty() {
        return Err(LlmError::Validation(
            "messages must not be empty".to_string(),
        ));
    }
    if params.model.is_empty() {
        return Err(LlmError::Validation("model must not be empty".to_string()));
    }
    if let Some(temperature) = params.temperature {
        if !(0.0..=2.0).contains(&temperature) {
            return Err(LlmError::Validation(format!(
                "temperature {temperature} outside the 0.0..=2.0 range"
            )));
        }
    }
    Ok(())
}

async fn classify_response(response: Response) -> LlmError {
    let status = response.status();
    let retry_after = parse_retry_after(&response);
    let message = response.text().await.unwrap_or_default();

    match status {
        StatusCode::UNAUTHORIZED => LlmError::Authentication(message),
        StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimit { retry_after },
        status if status.is_server_error() => LlmError::Server {
            status: status.as_u16(),
            message,
        },
        status => LlmError::Client {
            status: status.as_u16(),
            message,
        },
    }
}

fn parse_retry_after(response: &Response) -> Option<std::time::Duration> {
    response
        .headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(std::time::Duration::from_secs)
}

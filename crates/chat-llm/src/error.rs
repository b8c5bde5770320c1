use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    /// Malformed input (empty message array, out-of-range temperature).
    /// Raised before any network attempt.
    #[error("validation error: {0}")]
    Validation(String),

    /// Missing or unusable client configuration, e.g. no credential.
    #[error("config error: {0}")]
    Config(String),

    /// HTTP 401. Terminal, never retried.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// HTTP 429. Terminal here; the caller decides whether to retry later
    /// using the server-supplied delay.
    #[error("rate limited (retry after {retry_after:?})")]
    RateLimit { retry_after: Option<Duration> },

    /// Connect/read timeout. Retried up to the attempt limit.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// HTTP 5xx. Retried up to the attempt limit.
    #[error("server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    /// Other HTTP 4xx. Terminal, never retried.
    #[error("client error (HTTP {status}): {message}")]
    Client { status: u16, message: String },

    /// Cooperative abort; carries everything streamed before the
    /// cancellation took effect.
    #[error("request cancelled ({} chars of partial output)", partial.len())]
    Cancelled { partial: String },

    /// Mid-stream transport failure; carries the partial output so the
    /// caller can decide whether to keep it.
    #[error("stream error: {message}")]
    Stream { message: String, partial: String },

    /// Well-formed HTTP exchange with a body this client cannot interpret.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LlmError {
    /// Transient classes eligible for local retry with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LlmError::Timeout(_) | LlmError::Server { .. })
    }

    /// Partial output attached to the error, if this class carries any.
    pub fn partial_output(&self) -> Option<&str> {
        match self {
            LlmError::Cancelled { partial } | LlmError::Stream { partial, .. } => {
                Some(partial.as_str())
            }
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, LlmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_timeout_and_server_errors_are_retryable() {
        assert!(LlmError::Timeout("connect".into()).is_retryable());
        assert!(LlmError::Server { status: 503, message: String::new() }.is_retryable());

        assert!(!LlmError::RateLimit { retry_after: None }.is_retryable());
        assert!(!LlmError::Authentication("bad key".into()).is_retryable());
        assert!(!LlmError::Client { status: 404, message: String::new() }.is_retryable());
        assert!(!LlmError::Validation("empty".into()).is_retryable());
    }

    #[test]
    fn partial_output_is_exposed_for_cancellation_and_stream_errors() {
        let cancelled = LlmError::Cancelled { partial: "so far".into() };
        assert_eq!(cancelled.partial_output(), Some("so far"));

        let stream = LlmError::Stream { message: "reset".into(), partial: "half".into() };
        assert_eq!(stream.partial_output(), Some("half"));

        assert!(LlmError::Timeout("t".into()).partial_output().is_none());
    }
}

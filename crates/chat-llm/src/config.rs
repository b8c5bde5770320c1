use std::time::Duration;

use crate::retry::DEFAULT_MAX_ATTEMPTS;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client configuration, with environment-variable overrides.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Bearer credential. Required before any request is issued.
    pub api_key: Option<String>,
    pub base_url: String,
    pub max_attempts: u32,
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..Self::default()
        }
    }

    /// Defaults overridden by `CHAT_API_KEY` / `CHAT_API_BASE` when set.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(api_key) = std::env::var("CHAT_API_KEY") {
            config.api_key = Some(api_key);
        }
        if let Ok(base_url) = std::env::var("CHAT_API_BASE") {
            config.base_url = base_url;
        }
        config
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }
}

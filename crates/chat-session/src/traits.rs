//! Collaborator interfaces. Implementations live outside this core.

use std::time::Duration;

use async_trait::async_trait;

use chat_core::Message;

use crate::error::SessionError;

pub const DEFAULT_MAX_CONTEXT_TOKENS: u32 = 32_000;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Read-only access to stored conversation history.
///
/// Messages come back in insertion order, not necessarily chronological;
/// the context builder re-sorts. All flag fields are populated.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn conversation_messages(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<Message>, SessionError>;

    async fn system_prelude(&self, conversation_id: &str)
        -> Result<Option<String>, SessionError>;
}

/// Per-conversation model/budget settings.
#[async_trait]
pub trait SettingsProvider: Send + Sync {
    async fn settings(&self, conversation_id: &str)
        -> Result<ConversationSettings, SessionError>;
}

#[derive(Debug, Clone)]
pub struct ConversationSettings {
    pub max_context_tokens: u32,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    /// Auto-cancel budget for one outbound call; `Duration::ZERO` disables.
    pub request_timeout: Duration,
}

impl ConversationSettings {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            max_context_tokens: DEFAULT_MAX_CONTEXT_TOKENS,
            model: model.into(),
            temperature: None,
            max_output_tokens: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

use std::sync::Arc;

use futures_util::StreamExt;

use chat_context::{ContextBuildResult, ContextBuilder, CurrentMessage};
use chat_llm::{ChatClient, Completion, LlmError, ModelParams, StreamEvent, Usage};
use chat_requests::{
    CancelledRequest, RegisterOptions, RequestKind, RequestRegistry, RequestStatus,
};

use crate::error::SessionError;
use crate::traits::{ConversationSettings, MessageStore, SettingsProvider};

/// Result of one streamed turn.
#[derive(Debug, Clone)]
pub struct StreamOutcome {
    /// Full assistant text, or the partial text when cancelled/timed out.
    pub content: String,
    pub finish_reason: Option<String>,
    pub usage: Option<Usage>,
    /// True when the turn ended through cancellation or timeout rather than
    /// stream completion.
    pub cancelled: bool,
}

/// Drives complete turns against the completion API for stored
/// conversations.
pub struct ChatSession {
    store: Arc<dyn MessageStore>,
    settings: Arc<dyn SettingsProvider>,
    builder: ContextBuilder,
    registry: RequestRegistry,
    client: ChatClient,
}

impl ChatSession {
    pub fn new(
        store: Arc<dyn MessageStore>,
        settings: Arc<dyn SettingsProvider>,
        builder: ContextBuilder,
        registry: RequestRegistry,
        client: ChatClient,
    ) -> Self {
        Self {
            store,
            settings,
            builder,
            registry,
            client,
        }
    }

    /// Blocking turn: build the context, track the call, return the full
    /// completion.
    pub async fn send_turn(
        &self,
        conversation_id: &str,
        current: &CurrentMessage,
    ) -> Result<Completion, SessionError> {
        let (context, settings) = self.prepare(conversation_id, current).await?;
        let params = model_params(&settings);

        let handle = self
            .registry
            .register(
                conversation_id,
                RegisterOptions::new(RequestKind::Sync).with_timeout(settings.request_timeout),
            )
            .await;

        let result = self.client.send(&context.entries, &params, &handle.cancel).await;
        self.registry.unregister(conversation_id, handle.request_id).await;
        Ok(result?)
    }

    /// Streaming turn: tokens are delivered to `on_token` in transport
    /// order. Cancellation and timeout end the turn with `cancelled: true`
    /// and whatever text had accumulated, not an error.
    pub async fn stream_turn(
        &self,
        conversation_id: &str,
        current: &CurrentMessage,
        mut on_token: impl FnMut(&str) + Send,
    ) -> Result<StreamOutcome, SessionError> {
        let (context, settings) = self.prepare(conversation_id, current).await?;
        let params = model_params(&settings);

        let handle = self
            .registry
            .register(
                conversation_id,
                RegisterOptions::new(RequestKind::Stream).with_timeout(settings.request_timeout),
            )
            .await;

        let stream = match self
            .client
            .stream(
                &context.entries,
                &params,
                handle.cancel.clone(),
                handle.transcript.clone(),
            )
            .await
        {
            Ok(stream) => stream,
            Err(LlmError::Cancelled { partial }) => {
                self.registry.unregister(conversation_id, handle.request_id).await;
                return Ok(StreamOutcome {
                    content: partial,
                    finish_reason: None,
                    usage: None,
                    cancelled: true,
                });
            }
            Err(error) => {
                self.registry.unregister(conversation_id, handle.request_id).await;
                return Err(error.into());
            }
        };

        let mut stream = stream;
        let mut finish_reason = None;
        let mut usage = None;
        let mut cancelled = false;
        let mut failure: Option<LlmError> = None;

        while let Some(item) = stream.next().await {
            match item {
                Ok(StreamEvent::Token(text)) => on_token(&text),
                Ok(StreamEvent::Done {
                    finish_reason: reason,
                    usage: final_usage,
                }) => {
                    finish_reason = reason;
                    usage = final_usage;
                    break;
                }
                Err(LlmError::Cancelled { .. }) => {
                    cancelled = true;
                    break;
                }
                Err(error) => {
                    failure = Some(error);
                    break;
                }
            }
        }

        let content = handle.transcript.snapshot();
        // No-op when the entry is already gone (cancel/timeout) or when the
        // key is now owned by a request that superseded this turn.
        self.registry.unregister(conversation_id, handle.request_id).await;

        if let Some(error) = failure {
            return Err(error.into());
        }

        Ok(StreamOutcome {
            content,
            finish_reason,
            usage,
            cancelled,
        })
    }

    /// Cancel the conversation's in-flight call, returning its partial text.
    pub async fn cancel(&self, conversation_id: &str) -> Option<CancelledRequest> {
        self.registry.cancel(conversation_id).await
    }

    pub async fn active_request(&self, conversation_id: &str) -> Option<RequestStatus> {
        self.registry.get(conversation_id).await
    }

    pub async fn has_active_request(&self, conversation_id: &str) -> bool {
        self.registry.has_active(conversation_id).await
    }

    async fn prepare(
        &self,
        conversation_id: &str,
        current: &CurrentMessage,
    ) -> Result<(ContextBuildResult, ConversationSettings), SessionError> {
        let messages = self.store.conversation_messages(conversation_id).await?;
        let prelude = self.store.system_prelude(conversation_id).await?;
        let settings = self.settings.settings(conversation_id).await?;

        let context = self.builder.build(
            prelude.as_deref(),
            &messages,
            current,
            settings.max_context_tokens,
        )?;

        if context.truncation_applied {
            log::info!(
                "[{}] context truncated: {} messages excluded, ~{} tokens sent",
                conversation_id,
                context.excluded_count,
                context.estimated_total_tokens
            );
        }

        Ok((context, settings))
    }
}

fn model_params(settings: &ConversationSettings) -> ModelParams {
    ModelParams {
        model: settings.model.clone(),
        max_tokens: settings.max_output_tokens,
        temperature: settings.temperature,
        json_mode: false,
    }
}

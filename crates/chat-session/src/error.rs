use thiserror::Error;

use chat_context::ContextError;
use chat_llm::LlmError;

#[derive(Debug, Error)]
pub enum SessionError {
    /// Failure inside a collaborator (message store, settings provider).
    #[error("store error: {0}")]
    Store(String),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Llm(#[from] LlmError),
}

//! Outbound chat-completion client.
//!
//! [`ChatClient`] issues the HTTP call in blocking or streaming mode,
//! classifies failures into the [`LlmError`] taxonomy, retries transient
//! classes with exponential backoff (sync and pre-stream-start only), and in
//! streaming mode parses server-sent-event frames into an ordered token
//! stream with cooperative cancellation.

pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod retry;

mod sse;

pub use client::ChatClient;
pub use config::ClientConfig;
pub use error::{LlmError, Result};
pub use protocol::{
    ChatRequest, ChatResponse, Completion, ModelParams, StreamEvent, TokenStream, Usage,
};

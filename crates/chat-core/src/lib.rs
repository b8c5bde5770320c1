//! Shared data model for the chat context/request core.
//!
//! Owns the message shape (including the context-inclusion flags), the
//! wire-ready [`ContextEntry`] projection, and the [`PartialTranscript`]
//! buffer shared between the request registry and the streaming executor.

pub mod entry;
pub mod message;
pub mod transcript;

pub use entry::ContextEntry;
pub use message::{Message, Role};
pub use transcript::PartialTranscript;

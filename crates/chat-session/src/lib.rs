//! Conversation-level orchestration.
//!
//! Ties the pure context builder, the request registry and the HTTP client
//! together behind the collaborator interfaces: a [`MessageStore`] supplies
//! history and the system prelude, a [`SettingsProvider`] supplies the token
//! budget and model choice, and [`ChatSession`] drives one turn end to end
//! (build -> register -> execute -> unregister).

pub mod error;
pub mod session;
pub mod traits;

pub use error::SessionError;
pub use session::{ChatSession, StreamOutcome};
pub use traits::{ConversationSettings, MessageStore, SettingsProvider};

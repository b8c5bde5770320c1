use serde::{Deserialize, Serialize};

use crate::message::{Message, Role};

/// Wire-ready `{role, content}` projection of a message.
///
/// This is exactly the shape the completion API accepts, so the request body
/// serializes entries as-is; internal fields like `id`, `created_at` and the
/// inclusion flags never leak onto the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContextEntry {
    pub role: Role,
    pub content: String,
}

impl ContextEntry {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

impl From<&Message> for ContextEntry {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
        }
    }
}

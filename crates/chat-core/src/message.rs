use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A stored conversation message with its context-inclusion flags.
///
/// The flag fields are total: deserialization fills in explicit defaults
/// (`include_in_context: true`, everything else `false`), so consumers never
/// have to null-coalesce. The owning store upholds the flag invariants
/// (`is_discarded` implies `include_in_context == false`, `pure_aside`
/// implies `is_aside`); this crate treats them as given.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(default = "generate_id")]
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// When false the message is skipped by every future context window.
    #[serde(default = "default_true")]
    pub include_in_context: bool,
    /// Included only in the turn it was sent, excluded from later windows
    /// (unless pinned).
    #[serde(default)]
    pub is_aside: bool,
    /// Aside whose own context window was system prelude + itself only.
    #[serde(default)]
    pub pure_aside: bool,
    /// Survives truncation regardless of age.
    #[serde(default)]
    pub is_pinned: bool,
    /// Permanently excluded from every future context window.
    #[serde(default)]
    pub is_discarded: bool,
}

fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

fn default_true() -> bool {
    true
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            created_at: Utc::now(),
            include_in_context: true,
            is_aside: false,
            pure_aside: false,
            is_pinned: false,
            is_discarded: false,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn pinned(mut self) -> Self {
        self.is_pinned = true;
        self
    }

    pub fn aside(mut self) -> Self {
        self.is_aside = true;
        self
    }

    /// Marks the message discarded, which also drops it from context.
    pub fn discarded(mut self) -> Self {
        self.is_discarded = true;
        self.include_in_context = false;
        self
    }

    pub fn excluded_from_context(mut self) -> Self {
        self.include_in_context = false;
        self
    }
}

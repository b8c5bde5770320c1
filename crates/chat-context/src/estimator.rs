//! Token estimation for budget enforcement.
//!
//! Provides heuristic chars/4 estimation behind a trait so an exact
//! tokenizer can be substituted without touching any caller.

use std::sync::Arc;

use chat_core::ContextEntry;

/// Trait for token count estimation.
pub trait TokenEstimator: Send + Sync {
    /// Approximate token count for a piece of text. Never fails; empty text
    /// is 0 tokens.
    fn estimate(&self, text: &str) -> u32;

    /// Sum of estimates over wire entries.
    fn estimate_entries(&self, entries: &[ContextEntry]) -> u32 {
        entries
            .iter()
            .fold(0u32, |acc, e| acc.saturating_add(self.estimate(&e.content)))
    }
}

/// Arc-wrapped estimator for injection.
pub type SharedTokenEstimator = Arc<dyn TokenEstimator>;

/// Character-based token estimator.
///
/// Uses the approximation `tokens ≈ ceil(chars / 4)` as a stand-in for
/// sub-word tokenization. Deliberately rough: real tokenizers differ per
/// model, and the budget math only needs a stable, monotone estimate.
#[derive(Debug, Clone)]
pub struct HeuristicTokenEstimator {
    /// Characters per token ratio (default: 4)
    chars_per_token: f64,
}

impl HeuristicTokenEstimator {
    pub fn new(chars_per_token: f64) -> Self {
        Self { chars_per_token }
    }
}

impl Default for HeuristicTokenEstimator {
    fn default() -> Self {
        Self::new(4.0)
    }
}

impl TokenEstimator for HeuristicTokenEstimator {
    fn estimate(&self, text: &str) -> u32 {
        if text.is_empty() {
            return 0;
        }

        let chars = text.chars().count() as f64;
        (chars / self.chars_per_token).ceil() as u32
    }
}

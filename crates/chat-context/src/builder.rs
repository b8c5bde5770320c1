//! Context window assembly with budget enforcement.
//!
//! Implements the selection/ordering/truncation algorithm:
//! 1. Emit the system prelude first (if any) and reserve its tokens.
//! 2. Pure-aside current messages short-circuit to `[system?, current]`.
//! 3. Filter prior messages on timestamp and inclusion flags.
//! 4. Order the eligible set chronologically.
//! 5. Reserve tokens for the system entry and the current message.
//! 6. Estimate tokens per eligible message.
//! 7. On overflow keep all pinned messages, then fill with non-pinned
//!    messages newest-first; emission is always chronological.
//! 8. Emit `[system?, selected..., current]`.

use chrono::{DateTime, Utc};

use chat_core::{ContextEntry, Message, Role};

use crate::error::ContextError;
use crate::estimator::SharedTokenEstimator;

/// The draft message the context is being built for.
///
/// Not yet a stored [`Message`]: it has no id, its timestamp is optional
/// (absent means "newer than everything"), and only the `pure_aside` flag is
/// meaningful at build time.
#[derive(Debug, Clone)]
pub struct CurrentMessage {
    /// Defaults to [`Role::User`] when unset.
    pub role: Option<Role>,
    pub content: String,
    pub created_at: Option<DateTime<Utc>>,
    pub pure_aside: bool,
}

impl CurrentMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Some(Role::User),
            content: content.into(),
            created_at: None,
            pure_aside: false,
        }
    }

    pub fn pure_aside(content: impl Into<String>) -> Self {
        Self {
            pure_aside: true,
            ..Self::user(content)
        }
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }
}

/// Ordered, budget-bounded context window plus build diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextBuildResult {
    pub entries: Vec<ContextEntry>,
    /// Reserved tokens (system + current) plus estimates of every selected
    /// prior message.
    pub estimated_total_tokens: u32,
    pub truncation_applied: bool,
    /// Eligible prior messages that were dropped by truncation.
    pub excluded_count: usize,
}

/// Builds context windows with an injected token estimator.
pub struct ContextBuilder {
    estimator: SharedTokenEstimator,
}

impl ContextBuilder {
    pub fn new(estimator: SharedTokenEstimator) -> Self {
        Self { estimator }
    }

    /// Assemble the context window for `current` from `prior` history.
    ///
    /// Pure and deterministic: identical inputs produce identical output.
    /// An empty `current.content` is a caller contract violation and fails
    /// before any selection runs.
    pub fn build(
        &self,
        system_prelude: Option<&str>,
        prior: &[Message],
        current: &CurrentMessage,
        max_tokens: u32,
    ) -> Result<ContextBuildResult, ContextError> {
        if current.content.is_empty() {
            return Err(ContextError::Validation(
                "current message has no content".to_string(),
            ));
        }

        let system_entry = system_prelude
            .filter(|text| !text.is_empty())
            .map(|text| ContextEntry::new(Role::System, text));
        let current_entry =
            ContextEntry::new(current.role.unwrap_or(Role::User), current.content.clone());

        let system_tokens = system_entry
            .as_ref()
            .map(|entry| self.estimator.estimate(&entry.content))
            .unwrap_or(0);
        let current_tokens = self.estimator.estimate(&current_entry.content);
        let reserved = system_tokens.saturating_add(current_tokens);

        // Pure asides see no history at all: system prelude + current only.
        if current.pure_aside {
            return Ok(ContextBuildResult {
                entries: assemble(system_entry, Vec::new(), current_entry),
                estimated_total_tokens: reserved,
                truncation_applied: false,
                excluded_count: 0,
            });
        }

        // Eligibility: strictly older than the current message (when it has a
        // timestamp), not discarded, not opted out, and asides only survive
        // past their own turn when pinned. Pinning does not override discard
        // or include_in_context.
        let mut eligible: Vec<&Message> = prior
            .iter()
            .filter(|m| match current.created_at {
                Some(cutoff) => m.created_at < cutoff,
                None => true,
            })
            .filter(|m| !m.is_discarded && m.include_in_context && (!m.is_aside || m.is_pinned))
            .collect();

        // Stable sort: equal timestamps keep their input order.
        eligible.sort_by_key(|m| m.created_at);

        let remaining_budget = max_tokens.saturating_sub(reserved);
        let costs: Vec<u32> = eligible
            .iter()
            .map(|m| self.estimator.estimate(&m.content))
            .collect();
        let total: u32 = costs.iter().fold(0u32, |acc, c| acc.saturating_add(*c));

        let (selected, truncation_applied) = if total <= remaining_budget {
            ((0..eligible.len()).collect(), false)
        } else {
            (
                select_within_budget(&eligible, &costs, remaining_budget),
                true,
            )
        };

        let selected_tokens = selected
            .iter()
            .fold(0u32, |acc, &i| acc.saturating_add(costs[i]));
        let excluded_count = eligible.len() - selected.len();

        let selected_entries: Vec<ContextEntry> = selected
            .iter()
            .map(|&i| ContextEntry::from(eligible[i]))
            .collect();

        Ok(ContextBuildResult {
            entries: assemble(system_entry, selected_entries, current_entry),
            estimated_total_tokens: reserved.saturating_add(selected_tokens),
            truncation_applied,
            excluded_count,
        })
    }
}

/// Pick which eligible messages survive truncation.
///
/// `eligible` is already chronological; the returned indices are re-sorted so
/// emission stays chronological even though non-pinned selection walks
/// newest-first.
fn select_within_budget(eligible: &[&Message], costs: &[u32], remaining_budget: u32) -> Vec<usize> {
    let pinned: Vec<usize> = (0..eligible.len())
        .filter(|&i| eligible[i].is_pinned)
        .collect();
    let pinned_tokens = pinned
        .iter()
        .fold(0u32, |acc, &i| acc.saturating_add(costs[i]));

    // Pinned messages are never trimmed, even when they alone blow the
    // budget; the overflow is surfaced via truncation_applied instead.
    if pinned_tokens > remaining_budget {
        log::warn!(
            "pinned messages alone exceed the context budget ({} > {} tokens); including all {} pinned messages anyway",
            pinned_tokens,
            remaining_budget,
            pinned.len()
        );
        return pinned;
    }

    let mut chosen = pinned.clone();
    let mut used = pinned_tokens;

    // Fill newest-first so the oldest non-pinned messages drop first; stop at
    // the first candidate that no longer fits.
    for i in (0..eligible.len()).rev() {
        if eligible[i].is_pinned {
            continue;
        }
        if used.saturating_add(costs[i]) > remaining_budget {
            break;
        }
        used = used.saturating_add(costs[i]);
        chosen.push(i);
    }

    chosen.sort_unstable();
    chosen
}

fn assemble(
    system_entry: Option<ContextEntry>,
    selected: Vec<ContextEntry>,
    current_entry: ContextEntry,
) -> Vec<ContextEntry> {
    let mut entries = Vec::with_capacity(selected.len() + 2);
    if let Some(system) = system_entry {
        entries.push(system);
    }
    entries.extend(selected);
    entries.push(current_entry);
    entries
}

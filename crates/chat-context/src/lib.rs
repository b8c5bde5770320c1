//! Deterministic context window construction.
//!
//! [`ContextBuilder`] selects, orders and truncates prior messages into the
//! bounded `{role, content}` array sent to the completion API, driven by the
//! per-message inclusion flags and a token budget. Token counts come from a
//! pluggable [`TokenEstimator`]; the default is a chars/4 heuristic, so the
//! budget is enforced on estimates, not exact tokenizer output.
//!
//! Building is pure: no I/O, no clock reads, and identical inputs always
//! produce identical output.

pub mod builder;
pub mod error;
pub mod estimator;

pub use builder::{ContextBuildResult, ContextBuilder, CurrentMessage};
pub use error::ContextError;
pub use estimator::{HeuristicTokenEstimator, SharedTokenEstimator, TokenEstimator};

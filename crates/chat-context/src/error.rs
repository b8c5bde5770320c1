use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContextError {
    /// Caller contract violation, raised before any selection runs.
    #[error("validation error: {0}")]
    Validation(String),
}

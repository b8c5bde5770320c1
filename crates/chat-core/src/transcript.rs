use std::sync::{Arc, Mutex};

/// Append-only text buffer shared between the request registry and the
/// streaming executor.
///
/// The registry creates one per active request and hands a clone to the
/// executor; the executor appends each streamed token through it, so a later
/// cancellation or timeout can return everything produced so far. Cloning is
/// cheap and all clones observe the same buffer.
#[derive(Debug, Clone, Default)]
pub struct PartialTranscript {
    inner: Arc<Mutex<String>>,
}

impl PartialTranscript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, text: &str) {
        self.lock().push_str(text);
    }

    /// Copy of the accumulated text at this instant.
    pub fn snapshot(&self) -> String {
        self.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, String> {
        // A poisoned lock only means a writer panicked mid-append; the
        // partial text is still worth returning.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

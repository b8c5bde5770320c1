use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use chat_core::PartialTranscript;

/// Whether the tracked call is a blocking completion or a token stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Sync,
    Stream,
}

/// Invoked when a request times out, after it has been removed from the
/// registry. Runs with the registry lock released, so it may call back into
/// the registry freely.
pub type TimeoutCallback = Box<dyn FnOnce(TimedOutRequest) -> BoxFuture<'static, ()> + Send>;

pub struct RegisterOptions {
    pub kind: RequestKind,
    /// `Duration::ZERO` disables the timeout timer.
    pub timeout: Duration,
    pub on_timeout: Option<TimeoutCallback>,
}

impl RegisterOptions {
    pub fn new(kind: RequestKind) -> Self {
        Self {
            kind,
            timeout: Duration::ZERO,
            on_timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_on_timeout(mut self, callback: TimeoutCallback) -> Self {
        self.on_timeout = Some(callback);
        self
    }
}

/// What the executor needs from a registered request: the cancellation token
/// to watch and the transcript to append streamed tokens to. The map entry
/// itself stays owned by the registry.
#[derive(Debug, Clone)]
pub struct RequestHandle {
    pub request_id: Uuid,
    pub cancel: CancellationToken,
    pub transcript: PartialTranscript,
}

#[derive(Debug, Clone)]
pub struct CancelledRequest {
    pub request_id: Uuid,
    /// Everything the executor appended before cancellation took effect.
    pub partial_text: String,
}

#[derive(Debug, Clone)]
pub struct TimedOutRequest {
    pub conversation_id: String,
    pub request_id: Uuid,
    pub partial_text: String,
}

/// Read-only status snapshot of an active request.
#[derive(Debug, Clone)]
pub struct RequestStatus {
    pub request_id: Uuid,
    pub kind: RequestKind,
    pub elapsed: Duration,
    pub has_partial: bool,
}

struct ActiveRequest {
    request_id: Uuid,
    kind: RequestKind,
    cancel: CancellationToken,
    transcript: PartialTranscript,
    started_at: Instant,
    timeout_task: Option<JoinHandle<()>>,
}

impl ActiveRequest {
    /// Cancel the outbound call and disarm the timer. Only ever called after
    /// the entry has been removed from the map.
    fn abort(&self) {
        if let Some(task) = &self.timeout_task {
            task.abort();
        }
        self.cancel.cancel();
    }

    fn disarm_timer(&self) {
        if let Some(task) = &self.timeout_task {
            task.abort();
        }
    }
}

/// Conversation id -> active request map.
///
/// Clones share the same map, so a handler can hold one clone while spawned
/// timeout timers hold another.
#[derive(Clone, Default)]
pub struct RequestRegistry {
    inner: Arc<Mutex<HashMap<String, ActiveRequest>>>,
}

impl RequestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new outbound call for `conversation_id`.
    ///
    /// Last request wins: an already-registered request for the same
    /// conversation is cancelled first. This is deliberate supersession, not
    /// an error.
    pub async fn register(
        &self,
        conversation_id: &str,
        options: RegisterOptions,
    ) -> RequestHandle {
        let request_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let transcript = PartialTranscript::new();

        let superseded = {
            let mut map = self.inner.lock().await;
            map.insert(
                conversation_id.to_string(),
                ActiveRequest {
                    request_id,
                    kind: options.kind,
                    cancel: cancel.clone(),
                    transcript: transcript.clone(),
                    started_at: Instant::now(),
                    timeout_task: None,
                },
            )
        };

        if let Some(previous) = superseded {
            log::info!(
                "[{}] superseding request {} with {}",
                conversation_id,
                previous.request_id,
                request_id
            );
            previous.abort();
        }

        if options.timeout > Duration::ZERO {
            self.arm_timeout(conversation_id, request_id, options.timeout, options.on_timeout)
                .await;
        }

        RequestHandle {
            request_id,
            cancel,
            transcript,
        }
    }

    /// Cancel the active request, if any. Idempotent: a second call (or a
    /// call racing a completed/timed-out request) returns `None` with no
    /// side effects.
    pub async fn cancel(&self, conversation_id: &str) -> Option<CancelledRequest> {
        let entry = self.inner.lock().await.remove(conversation_id)?;
        entry.abort();
        let partial_text = entry.transcript.snapshot();
        log::info!(
            "[{}] request {} cancelled ({} chars of partial output)",
            conversation_id,
            entry.request_id,
            partial_text.len()
        );
        Some(CancelledRequest {
            request_id: entry.request_id,
            partial_text,
        })
    }

    /// Drop the entry on natural completion without signalling cancellation.
    ///
    /// Compare-and-remove keyed by request id: a superseded request's
    /// cleanup must never remove (or disarm the timer of) the request that
    /// replaced it under the same conversation key.
    pub async fn unregister(&self, conversation_id: &str, request_id: Uuid) {
        let removed = {
            let mut map = self.inner.lock().await;
            match map.get(conversation_id) {
                Some(entry) if entry.request_id == request_id => map.remove(conversation_id),
                _ => None,
            }
        };

        if let Some(entry) = removed {
            entry.disarm_timer();
            log::debug!(
                "[{}] request {} unregistered",
                conversation_id,
                entry.request_id
            );
        }
    }

    pub async fn get(&self, conversation_id: &str) -> Option<RequestStatus> {
        let map = self.inner.lock().await;
        map.get(conversation_id).map(|entry| RequestStatus {
            request_id: entry.request_id,
            kind: entry.kind,
            elapsed: entry.started_at.elapsed(),
            has_partial: !entry.transcript.is_empty(),
        })
    }

    pub async fn has_active(&self, conversation_id: &str) -> bool {
        self.inner.lock().await.contains_key(conversation_id)
    }

    pub async fn active_count(&self) -> usize {
        self.inner.lock().await.len()
    }

    async fn arm_timeout(
        &self,
        conversation_id: &str,
        request_id: Uuid,
        timeout: Duration,
        on_timeout: Option<TimeoutCallback>,
    ) {
        let registry = self.clone();
        let conversation = conversation_id.to_string();
        let task = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            registry.expire(&conversation, request_id, on_timeout).await;
        });

        // Attach the timer to the entry it guards; if the request was
        // superseded between the insert and here, the timer is stale and gets
        // dropped immediately.
        let mut map = self.inner.lock().await;
        match map.get_mut(conversation_id) {
            Some(entry) if entry.request_id == request_id => entry.timeout_task = Some(task),
            _ => task.abort(),
        }
    }

    /// Timer body: compare-and-remove keyed by request id, so a stale timer
    /// never cancels a newer, superseding request.
    async fn expire(
        &self,
        conversation_id: &str,
        request_id: Uuid,
        on_timeout: Option<TimeoutCallback>,
    ) {
        let expired = {
            let mut map = self.inner.lock().await;
            match map.get(conversation_id) {
                Some(entry) if entry.request_id == request_id => map.remove(conversation_id),
                _ => None,
            }
        };

        let Some(entry) = expired else { return };
        entry.cancel.cancel();
        let partial_text = entry.transcript.snapshot();
        log::warn!(
            "[{}] request {} timed_out after {:?} ({} chars of partial output)",
            conversation_id,
            request_id,
            entry.started_at.elapsed(),
            partial_text.len()
        );

        // Lock already released: the callback may re-enter the registry.
        if let Some(callback) = on_timeout {
            callback(TimedOutRequest {
                conversation_id: conversation_id.to_string(),
                request_id,
                partial_text,
            })
            .await;
        }
    }
}

//! Timeout-driven auto-cancellation behavior.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use chat_requests::{RegisterOptions, RequestKind, RequestRegistry, TimedOutRequest};

const SHORT: Duration = Duration::from_millis(30);

async fn settle() {
    tokio::time::sleep(SHORT * 4).await;
}

#[tokio::test]
async fn timeout_cancels_and_reports_partial_text() {
    let registry = RequestRegistry::new();
    let fired: Arc<Mutex<Option<TimedOutRequest>>> = Arc::new(Mutex::new(None));

    let sink = fired.clone();
    let handle = registry
        .register(
            "conv",
            RegisterOptions::new(RequestKind::Stream)
                .with_timeout(SHORT)
                .with_on_timeout(Box::new(move |timed_out| {
                    Box::pin(async move {
                        *sink.lock().await = Some(timed_out);
                    })
                })),
        )
        .await;
    handle.transcript.append("half an answer");

    settle().await;

    assert!(handle.cancel.is_cancelled());
    assert!(!registry.has_active("conv").await);

    let timed_out = fired.lock().await.take().expect("timeout callback fired");
    assert_eq!(timed_out.conversation_id, "conv");
    assert_eq!(timed_out.request_id, handle.request_id);
    assert_eq!(timed_out.partial_text, "half an answer");
}

#[tokio::test]
async fn completion_before_timeout_disarms_the_timer() {
    let registry = RequestRegistry::new();
    let handle = registry
        .register(
            "conv",
            RegisterOptions::new(RequestKind::Sync).with_timeout(SHORT),
        )
        .await;

    registry.unregister("conv", handle.request_id).await;
    settle().await;

    assert!(!handle.cancel.is_cancelled());
}

#[tokio::test]
async fn stale_timer_never_touches_a_superseding_request() {
    let registry = RequestRegistry::new();
    let _first = registry
        .register(
            "conv",
            RegisterOptions::new(RequestKind::Stream).with_timeout(SHORT),
        )
        .await;

    // Replace the request before the first timer could have fired, with a
    // much longer timeout of its own.
    let second = registry
        .register(
            "conv",
            RegisterOptions::new(RequestKind::Stream).with_timeout(Duration::from_secs(30)),
        )
        .await;

    settle().await;

    assert!(!second.cancel.is_cancelled());
    let status = registry.get("conv").await.expect("still active");
    assert_eq!(status.request_id, second.request_id);
}

#[tokio::test]
async fn stale_unregister_does_not_disarm_the_successor_timer() {
    let registry = RequestRegistry::new();
    let first = registry
        .register("conv", RegisterOptions::new(RequestKind::Stream))
        .await;
    let second = registry
        .register(
            "conv",
            RegisterOptions::new(RequestKind::Stream).with_timeout(SHORT),
        )
        .await;

    // The superseded request finishes (cancelled) and cleans up; the
    // replacement's timeout must still fire.
    registry.unregister("conv", first.request_id).await;
    settle().await;

    assert!(second.cancel.is_cancelled());
    assert!(!registry.has_active("conv").await);
}

#[tokio::test]
async fn timeout_callback_may_reenter_the_registry() {
    let registry = RequestRegistry::new();

    let reentrant = registry.clone();
    let handle = registry
        .register(
            "conv",
            RegisterOptions::new(RequestKind::Stream)
                .with_timeout(SHORT)
                .with_on_timeout(Box::new(move |_| {
                    Box::pin(async move {
                        // The entry is already gone; this must be a no-op,
                        // not a deadlock.
                        assert!(reentrant.cancel("conv").await.is_none());
                    })
                })),
        )
        .await;

    settle().await;
    assert!(handle.cancel.is_cancelled());
    assert!(!registry.has_active("conv").await);
}

#[tokio::test]
async fn explicit_cancel_beats_the_timer() {
    let registry = RequestRegistry::new();
    let fired = Arc::new(Mutex::new(false));

    let sink = fired.clone();
    let handle = registry
        .register(
            "conv",
            RegisterOptions::new(RequestKind::Stream)
                .with_timeout(SHORT)
                .with_on_timeout(Box::new(move |_| {
                    Box::pin(async move {
                        *sink.lock().await = true;
                    })
                })),
        )
        .await;
    handle.transcript.append("so far");

    let cancelled = registry.cancel("conv").await.expect("was active");
    assert_eq!(cancelled.partial_text, "so far");

    settle().await;
    assert!(!*fired.lock().await, "timer should have been disarmed");
}

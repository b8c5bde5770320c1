//! Per-conversation active request tracking.
//!
//! [`RequestRegistry`] enforces at-most-one-in-flight-call-per-conversation:
//! registering a new request supersedes (cancels) any previous one, explicit
//! cancellation and timeout both abort the outbound call cooperatively via
//! [`tokio_util::sync::CancellationToken`], and whatever partial output had
//! streamed in is always returned, never silently dropped.
//!
//! The registry is an explicit injected object, not a process-wide
//! singleton; tests instantiate isolated instances.

pub mod registry;

pub use registry::{
    CancelledRequest, RegisterOptions, RequestHandle, RequestKind, RequestRegistry, RequestStatus,
    TimedOutRequest, TimeoutCallback,
};

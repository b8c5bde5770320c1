//! Exponential backoff for transient failures.

use std::time::Duration;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Delay before retrying after failed attempt number `attempt` (0-based):
/// `2^attempt * 1000ms`.
pub fn backoff_delay(attempt: u32) -> Duration {
    // Clamp the shift so a misconfigured attempt count cannot overflow.
    Duration::from_millis(1000u64 << attempt.min(16))
}

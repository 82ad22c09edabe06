use std::time::Duration;

/// Base delay before the first reconnect attempt.
pub const BASE_DELAY_MS: u64 = 1000;

/// Compute the exponential backoff delay for a reconnect attempt, capped at
/// `max_delay`.
pub fn reconnect_delay(attempt: u32, max_delay: Duration) -> Duration {
    let exponent = attempt.min(30);
    Duration::from_millis(BASE_DELAY_MS.saturating_mul(2u64.saturating_pow(exponent))).min(max_delay)
}

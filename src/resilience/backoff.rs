//! Exponential backoff.

use std::time::Duration;

use crate::resilience::retries::RetryPolicy;

/// Delay before retry number `attempt` (1 for the first retry).
///
/// `base_delay_millis * 2^(attempt - 1)`, saturating at `u64::MAX`
/// milliseconds. Attempt 0 never waits.
pub fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    Duration::from_millis(calculate_backoff_ms(attempt, policy.base_delay_millis))
}

fn calculate_backoff_ms(attempt: u32, base_ms: u64) -> u64 {
    if attempt == 0 {
        return 0;
    }

    let exponential_base = 2u64.checked_pow(attempt - 1).unwrap_or(u64::MAX);
    base_ms.saturating_mul(exponential_base)
}

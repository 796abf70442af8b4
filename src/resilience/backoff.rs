//! Linear backoff.

use std::time::Duration;

/// Delay before retry number `attempt`: `attempt × base`, capped at `max`.
pub fn calculate_backoff(attempt: u32, base: Duration, max: Duration) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    base.saturating_mul(attempt).min(max)
}

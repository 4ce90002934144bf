//! Retry backoff schedule.

use std::time::Duration;

/// `min(base * 2^attempt, max)`.
#[must_use]
pub fn backoff(base: Duration, max: Duration, attempt: u32) -> Duration {
    let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
    base.checked_mul(factor).unwrap_or(max).min(max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_per_attempt() {
        let base = Duration::from_secs(2);
        let max = Duration::from_secs(300);
        assert_eq!(backoff(base, max, 0), Duration::from_secs(2));
        assert_eq!(backoff(base, max, 1), Duration::from_secs(4));
        assert_eq!(backoff(base, max, 5), Duration::from_secs(64));
    }

    #[test]
    fn caps_at_max() {
        let base = Duration::from_secs(2);
        let max = Duration::from_secs(300);
        assert_eq!(backoff(base, max, 10), max);
        assert_eq!(backoff(base, max, 64), max);
    }
}

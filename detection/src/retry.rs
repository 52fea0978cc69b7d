//! Retry policy for transient failures (notification dispatch, broker
//! reconnects).

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Exponential backoff with a cap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (0 = no retries).
    pub max_retries: u32,
    /// Initial backoff delay in milliseconds.
    pub initial_backoff_ms: u64,
    /// Backoff multiplier (e.g., 2.0 for exponential).
    pub backoff_multiplier: f64,
    /// Maximum backoff delay in milliseconds.
    pub max_backoff_ms: u64,
}

impl RetryPolicy {
    /// Delay before retry number `attempt`; attempt 0 is the first try and
    /// waits nothing. Any attempt number is accepted: the exponent saturates
    /// instead of wrapping, and the float-to-int cast saturates on overflow.
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        let Some(exponent) = attempt.checked_sub(1) else {
            return 0;
        };
        let exponent = i32::try_from(exponent).unwrap_or(i32::MAX);
        let delay = self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(exponent);
        (delay as u64).min(self.max_backoff_ms)
    }

    /// Whether another retry is allowed given the attempt count.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    /// Get the backoff as a Duration for a given attempt.
    pub fn backoff_duration(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_ms(attempt))
    }

    /// Policy for broker reconnects: 1s doubling up to 60s, never gives up.
    pub fn reconnect() -> Self {
        Self {
            max_retries: u32::MAX,
            initial_backoff_ms: 1_000,
            backoff_multiplier: 2.0,
            max_backoff_ms: 60_000,
        }
    }
}

impl Default for RetryPolicy {
    /// Default: 3 retries, 1s initial backoff, 2x multiplier, 10s max.
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 1_000,
            backoff_multiplier: 2.0,
            max_backoff_ms: 10_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_sequence() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_ms(0), 0);
        assert_eq!(policy.backoff_ms(1), 1_000);
        assert_eq!(policy.backoff_ms(2), 2_000);
        assert_eq!(policy.backoff_ms(3), 4_000);
        assert_eq!(policy.backoff_ms(5), 10_000);
    }

    #[test]
    fn test_huge_attempt_stays_at_cap() {
        let policy = RetryPolicy::reconnect();
        for attempt in [64, i32::MAX as u32, i32::MAX as u32 + 2, u32::MAX] {
            assert_eq!(policy.backoff_ms(attempt), 60_000, "attempt {attempt}");
        }
    }

    #[test]
    fn test_should_retry_bound() {
        let policy = RetryPolicy {
            max_retries: 2,
            ..Default::default()
        };
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(1));
        assert!(!policy.should_retry(2));
    }

    #[test]
    fn test_reconnect_caps_at_a_minute() {
        let policy = RetryPolicy::reconnect();
        assert_eq!(policy.backoff_duration(30), Duration::from_secs(60));
        assert!(policy.should_retry(10_000));
    }
}

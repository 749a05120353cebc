//! Declarative retry policy: bounded attempts with a fixed delay.

use std::time::Duration;

/// Retry schedule for one logical request.
///
/// Applies to connection-level failures and to the retryable status set
/// (429, 502, 503, 504). Domain-level rejections such as 4xx validation
/// errors surface immediately; retrying them would not change the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Values below 1 behave as 1.
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    pub backoff_seconds: u64,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, backoff_seconds: u64) -> Self {
        Self {
            max_attempts,
            backoff_seconds,
        }
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_seconds)
    }

    /// Whether a status code is worth retrying. Overload and gateway
    /// conditions only; anything the server decided about the request
    /// itself is final.
    pub fn is_retryable_status(status: u16) -> bool {
        matches!(status, 429 | 502 | 503 | 504)
    }
}

impl Default for RetryPolicy {
    /// Single attempt, no delay.
    fn default() -> Self {
        Self::new(1, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_statuses() {
        for status in [429, 502, 503, 504] {
            assert!(RetryPolicy::is_retryable_status(status), "{status}");
        }
        for status in [200, 201, 400, 401, 403, 404, 409, 500] {
            assert!(!RetryPolicy::is_retryable_status(status), "{status}");
        }
    }

    #[test]
    fn default_is_single_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.backoff(), Duration::ZERO);
    }
}

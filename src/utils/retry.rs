//! Exponential backoff policy.

use std::time::Duration;

use crate::models::{CrawlerConfig, SchedulerConfig};

/// Doubling backoff with an upper bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt
    pub max_retries: u32,
    /// Backoff before the first retry
    pub initial_backoff: Duration,
    /// Ceiling for any single backoff
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Per-request retry policy for the fetcher.
    pub fn for_requests(config: &CrawlerConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.retry_base_ms),
            max_backoff: Duration::from_millis(config.retry_max_ms),
        }
    }

    /// Whole-cycle backoff for the scheduler; never runs out of retries.
    pub fn for_cycles(config: &SchedulerConfig) -> Self {
        Self {
            max_retries: u32::MAX,
            initial_backoff: Duration::from_secs(config.backoff_base_secs),
            max_backoff: Duration::from_secs(config.backoff_max_secs),
        }
    }

    /// Backoff before retry number `attempt` (1-based): `initial * 2^(attempt-1)`, capped.
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.initial_backoff
            .checked_mul(1u32 << exponent)
            .map_or(self.max_backoff, |backoff| backoff.min(self.max_backoff))
    }

    /// Whether another attempt is allowed after `attempt` retries.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        }
    }

    #[test]
    fn test_calculate_backoff_exponential() {
        let policy = policy();
        assert_eq!(policy.calculate_backoff(1), Duration::from_millis(500));
        assert_eq!(policy.calculate_backoff(2), Duration::from_secs(1));
        assert_eq!(policy.calculate_backoff(3), Duration::from_secs(2));
    }

    #[test]
    fn test_calculate_backoff_capped() {
        let policy = policy();
        assert_eq!(policy.calculate_backoff(6), Duration::from_secs(8));
        assert_eq!(policy.calculate_backoff(200), Duration::from_secs(8));
    }

    #[test]
    fn test_should_retry() {
        let policy = policy();
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }

    #[test]
    fn test_cycle_policy_from_config() {
        let config = SchedulerConfig::default();
        let policy = RetryPolicy::for_cycles(&config);
        assert_eq!(policy.calculate_backoff(1), Duration::from_secs(30));
        assert_eq!(policy.calculate_backoff(2), Duration::from_secs(60));
        assert_eq!(policy.calculate_backoff(10), Duration::from_secs(15 * 60));
    }
}

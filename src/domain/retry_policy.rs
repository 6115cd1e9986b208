use crate::shared::config::RetryConfig;
use chrono::{DateTime, Duration, Utc};

/// How a dispatch failure should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Network trouble, timeouts, 5xx: try again later.
    Transient,
    /// The server rejected the request itself; retrying cannot help.
    Permanent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { next_retry_at: DateTime<Utc> },
    Fail,
}

/// Exponential backoff: `min(base * 2^(attempts-1), cap)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
    pub retry_client_errors: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::minutes(1),
            max_delay: Duration::minutes(16),
            max_attempts: 5,
            retry_client_errors: false,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            base_delay: Duration::seconds(config.base_delay as i64),
            max_delay: Duration::seconds(config.max_delay as i64),
            max_attempts: config.max_attempts.max(1),
            retry_client_errors: config.retry_client_errors,
        }
    }
}

impl RetryPolicy {
    /// Delay before the next try after `attempts` failed attempts.
    pub fn backoff(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(30);
        let factor = 1i32 << exponent;
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// `attempts` already includes the attempt that just failed.
    pub fn decide(
        &self,
        attempts: u32,
        max_attempts: u32,
        class: FailureClass,
        now: DateTime<Utc>,
    ) -> RetryDecision {
        if class == FailureClass::Permanent && !self.retry_client_errors {
            return RetryDecision::Fail;
        }
        if attempts >= max_attempts {
            return RetryDecision::Fail;
        }
        RetryDecision::Retry {
            next_retry_at: now + self.backoff(attempts),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_up_to_sixteen_minutes() {
        let policy = RetryPolicy::default();
        let minutes: Vec<i64> = (1..=7).map(|n| policy.backoff(n).num_minutes()).collect();
        assert_eq!(minutes, vec![1, 2, 4, 8, 16, 16, 16]);
    }

    #[test]
    fn backoff_survives_huge_attempt_counts() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(u32::MAX), Duration::minutes(16));
    }

    #[test]
    fn exhausted_attempts_fail() {
        let policy = RetryPolicy::default();
        let now = Utc::now();
        assert_eq!(
            policy.decide(5, 5, FailureClass::Transient, now),
            RetryDecision::Fail
        );
        assert_eq!(
            policy.decide(4, 5, FailureClass::Transient, now),
            RetryDecision::Retry {
                next_retry_at: now + Duration::minutes(8)
            }
        );
    }

    #[test]
    fn permanent_failures_skip_retry_unless_configured() {
        let now = Utc::now();
        let strict = RetryPolicy::default();
        assert_eq!(
            strict.decide(1, 5, FailureClass::Permanent, now),
            RetryDecision::Fail
        );

        let lenient = RetryPolicy {
            retry_client_errors: true,
            ..RetryPolicy::default()
        };
        assert!(matches!(
            lenient.decide(1, 5, FailureClass::Permanent, now),
            RetryDecision::Retry { .. }
        ));
    }

    #[test]
    fn policy_from_config() {
        let policy = RetryPolicy::from(&crate::shared::AppConfig::default().retry);
        assert_eq!(policy, RetryPolicy::default());
    }
}

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Bounded exponential retry policy for the artifact retrieval loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the second attempt.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Exponential multiplier per further attempt.
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    /// Upper bound for computed backoff.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_initial_backoff_ms() -> u64 {
    2_000
}

const fn default_backoff_factor() -> f64 {
    2.0
}

const fn default_max_backoff_ms() -> u64 {
    30_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            backoff_factor: default_backoff_factor(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl RetryPolicy {
    /// A single attempt with no retries.
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn exponential(max_attempts: u32, initial_backoff_ms: u64, backoff_factor: f64) -> Self {
        let initial = if initial_backoff_ms == 0 {
            default_initial_backoff_ms()
        } else {
            initial_backoff_ms
        };
        let factor = if backoff_factor <= 0.0 {
            default_backoff_factor()
        } else {
            backoff_factor
        };
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff_ms: initial,
            backoff_factor: factor,
            max_backoff_ms: default_max_backoff_ms(),
        }
    }

    pub fn with_max_backoff_ms(mut self, max_backoff_ms: u64) -> Self {
        self.max_backoff_ms = max_backoff_ms.max(1);
        self
    }

    /// Whether attempt number `attempt` (1-based) is within budget.
    pub fn can_attempt(&self, attempt: u32) -> bool {
        attempt >= 1 && attempt <= self.max_attempts
    }

    /// Delay to wait before attempt number `attempt` (1-based).
    ///
    /// The first attempt is immediate; attempt `n >= 2` waits
    /// `initial * factor^(n - 2)`, capped at `max_backoff_ms`.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exp = self.backoff_factor.powi((attempt - 2) as i32);
        let base = (self.initial_backoff_ms as f64 * exp).round() as u64;
        let clamped = base.min(self.max_backoff_ms.max(1));
        Duration::from_millis(clamped)
    }
}

#[cfg(test)]
mod tests {
    use super::RetryPolicy;

    #[test]
    fn default_policy_is_three_attempts_from_two_seconds() {
        let p = RetryPolicy::default();
        assert_eq!(p.max_attempts, 3);
        assert_eq!(p.delay_before(1).as_millis(), 0);
        assert_eq!(p.delay_before(2).as_millis(), 2_000);
        assert_eq!(p.delay_before(3).as_millis(), 4_000);
        assert!(p.can_attempt(3));
        assert!(!p.can_attempt(4));
    }

    #[test]
    fn exponential_policy_grows_with_cap() {
        let p = RetryPolicy::exponential(5, 100, 2.0).with_max_backoff_ms(250);
        assert_eq!(p.delay_before(2).as_millis(), 100);
        assert_eq!(p.delay_before(3).as_millis(), 200);
        assert_eq!(p.delay_before(4).as_millis(), 250);
    }

    #[test]
    fn once_never_retries() {
        let p = RetryPolicy::once();
        assert!(p.can_attempt(1));
        assert!(!p.can_attempt(2));
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let p: RetryPolicy = serde_json::from_str(r#"{"max_attempts":5}"#).expect("decode");
        assert_eq!(p.max_attempts, 5);
        assert_eq!(p.initial_backoff_ms, 2_000);
    }
}

//! Retry policies with bounded exponential backoff.
//!
//! A policy governs the attempt sequence of a single checkpointed step.
//! Intermediate attempts are not durable; only the final success or failure
//! of the whole sequence reaches the checkpoint log.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first retry (after attempt 1 fails).
    pub first_retry_interval: Duration,
    /// Total number of attempts, including the first. Must be at least 1.
    pub max_attempts: u32,
    /// Multiplier applied to the delay for each subsequent retry.
    pub backoff_coefficient: f64,
    /// Upper bound on any single delay. `None` means unbounded.
    pub max_retry_interval: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            first_retry_interval: Duration::from_millis(100),
            max_attempts: 3,
            backoff_coefficient: 2.0,
            max_retry_interval: None,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        assert!(max_attempts >= 1, "max_attempts must be at least 1");
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// Policy for steps that must never be retried: one attempt, no backoff.
    pub fn none() -> Self {
        Self::new(1)
    }

    /// Profile for costly model-backed steps: few attempts, long spacing,
    /// gentle backoff, so an expensive call is not repeated aggressively.
    pub fn llm() -> Self {
        Self {
            first_retry_interval: Duration::from_secs(30),
            max_attempts: 3,
            backoff_coefficient: 1.5,
            max_retry_interval: None,
        }
    }

    /// Profile for external API calls: more attempts, short initial spacing,
    /// steeper backoff, bounded maximum interval.
    pub fn external_api() -> Self {
        Self {
            first_retry_interval: Duration::from_secs(10),
            max_attempts: 5,
            backoff_coefficient: 2.0,
            max_retry_interval: Some(Duration::from_secs(180)),
        }
    }

    pub fn with_first_retry_interval(mut self, interval: Duration) -> Self {
        self.first_retry_interval = interval;
        self
    }

    pub fn with_backoff_coefficient(mut self, coefficient: f64) -> Self {
        self.backoff_coefficient = coefficient;
        self
    }

    pub fn with_max_retry_interval(mut self, interval: Duration) -> Self {
        self.max_retry_interval = Some(interval);
        self
    }

    /// Delay to wait after failed attempt `attempt` (1-indexed) before the
    /// next one: `min(first_retry_interval * coefficient^(attempt-1), cap)`.
    /// Returns `None` once the attempt budget is exhausted. An uncapped
    /// schedule that outgrows `Duration` saturates instead of overflowing.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let n = attempt.max(1);
        let factor = self.backoff_coefficient.powi((n - 1) as i32);
        let secs = self.first_retry_interval.as_secs_f64() * factor.max(0.0);
        let mut delay = if secs.is_finite() {
            Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
        } else {
            Duration::MAX
        };
        if let Some(cap) = self.max_retry_interval {
            if delay > cap {
                delay = cap;
            }
        }
        Some(delay)
    }
}

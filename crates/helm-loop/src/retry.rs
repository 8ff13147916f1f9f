//! Retry-with-fallback back-off policy.

use std::time::Duration;

use rand::Rng;

use helm_llm::ErrorClass;

use crate::config::LoopConfig;

/// Which model the next attempt targets. The first retryable failure moves
/// `Primary -> Fallback`; there is no way back within a directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPhase {
    Primary,
    Fallback,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    transient_delay_ms: u64,
    unknown_delay_ms: u64,
    rate_limit_delay_ms: u64,
    max_delay_ms: u64,
    jitter_range: (f64, f64),
}

impl RetryPolicy {
    pub fn from_config(config: &LoopConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            transient_delay_ms: config.transient_delay_ms,
            unknown_delay_ms: config.unknown_delay_ms,
            rate_limit_delay_ms: config.rate_limit_delay_ms,
            max_delay_ms: config.max_delay_ms,
            jitter_range: config.jitter_range,
        }
    }

    /// Back-off before retrying `attempt` (1-based). Exponential doubling on
    /// the per-class base; RATE_LIMIT keeps a hard floor at its base so a
    /// throttled backend is never hammered early; everything is capped at
    /// `max_delay_ms`.
    pub fn delay(&self, class: ErrorClass, attempt: u32) -> Duration {
        let jitter = rand::thread_rng().gen_range(self.jitter_range.0..=self.jitter_range.1);
        self.delay_with_jitter(class, attempt, jitter)
    }

    pub fn delay_with_jitter(&self, class: ErrorClass, attempt: u32, jitter: f64) -> Duration {
        let base = match class {
            ErrorClass::Transient => self.transient_delay_ms,
            ErrorClass::Unknown => self.unknown_delay_ms,
            ErrorClass::RateLimit => self.rate_limit_delay_ms,
            ErrorClass::Critical => return Duration::ZERO,
        };

        let exponent = attempt.saturating_sub(1).min(16);
        let exponential = base.saturating_mul(1u64 << exponent);
        let mut delay_ms = exponential as f64 * jitter;
        if class == ErrorClass::RateLimit {
            delay_ms = delay_ms.max(self.rate_limit_delay_ms as f64);
        }
        Duration::from_millis(delay_ms.min(self.max_delay_ms as f64) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::from_config(&LoopConfig::default())
    }

    #[test]
    fn transient_delay_doubles_per_attempt() {
        let policy = policy();
        assert_eq!(
            policy.delay_with_jitter(ErrorClass::Transient, 1, 1.0),
            Duration::from_millis(1000)
        );
        assert_eq!(
            policy.delay_with_jitter(ErrorClass::Transient, 2, 1.0),
            Duration::from_millis(2000)
        );
        assert_eq!(
            policy.delay_with_jitter(ErrorClass::Transient, 3, 1.0),
            Duration::from_millis(4000)
        );
    }

    #[test]
    fn unknown_uses_its_own_base() {
        let policy = policy();
        assert_eq!(
            policy.delay_with_jitter(ErrorClass::Unknown, 1, 1.0),
            Duration::from_millis(2000)
        );
    }

    #[test]
    fn rate_limit_never_drops_below_its_floor() {
        let policy = policy();
        // Low jitter would push 5000 * 0.75 = 3750 without the floor.
        assert_eq!(
            policy.delay_with_jitter(ErrorClass::RateLimit, 1, 0.75),
            Duration::from_millis(5000)
        );
        assert!(
            policy.delay_with_jitter(ErrorClass::RateLimit, 2, 1.0)
                >= Duration::from_millis(10_000)
        );
    }

    #[test]
    fn delays_are_capped() {
        let policy = policy();
        assert_eq!(
            policy.delay_with_jitter(ErrorClass::Transient, 12, 1.25),
            Duration::from_millis(60_000)
        );
    }

    #[test]
    fn critical_has_no_delay() {
        let policy = policy();
        assert_eq!(
            policy.delay_with_jitter(ErrorClass::Critical, 1, 1.0),
            Duration::ZERO
        );
    }

    #[test]
    fn sampled_jitter_stays_in_range() {
        let policy = policy();
        for _ in 0..100 {
            let delay = policy.delay(ErrorClass::Transient, 1);
            assert!(delay >= Duration::from_millis(750));
            assert!(delay <= Duration::from_millis(1250));
        }
    }
}

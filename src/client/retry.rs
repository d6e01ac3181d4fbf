//! Retry Policy
//!
//! Pure computation of backoff delay and retry eligibility. No I/O, no
//! clocks: given a fixed RNG the policy is fully deterministic, which keeps
//! the sleep decisions of [`crate::client::GenerationClient`] testable.

use std::time::Duration;

use rand::Rng;

use crate::constants::retry as retry_constants;
use crate::types::GenerationError;

/// Exponential backoff policy with symmetric jitter
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum retry attempts (attempts beyond this are refused)
    pub max_retries: u32,
    /// Base delay before exponentiation
    pub base_delay: Duration,
    /// Hard cap on the computed delay
    pub max_delay: Duration,
    /// Exponent base applied per attempt
    pub exponential_base: f64,
    /// Symmetric jitter factor in `[0, 1]`
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: retry_constants::MAX_RETRIES,
            base_delay: Duration::from_millis(retry_constants::BASE_DELAY_MS),
            max_delay: Duration::from_secs(retry_constants::MAX_DELAY_SECS),
            exponential_base: retry_constants::EXPONENTIAL_BASE,
            jitter_factor: retry_constants::JITTER_FACTOR,
        }
    }
}

impl RetryPolicy {
    /// Compute the backoff delay for the given attempt (0-based).
    ///
    /// `exponential = min(base * exponential_base^attempt, max_delay)`, then
    /// symmetric jitter in `[-jitter*exponential, +jitter*exponential]`,
    /// clamped to zero.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        self.next_delay_with_rng(attempt, &mut rand::rng())
    }

    /// Deterministic variant for a caller-supplied RNG
    pub fn next_delay_with_rng(&self, attempt: u32, rng: &mut impl Rng) -> Duration {
        let exponential = (self.base_delay.as_secs_f64()
            * self.exponential_base.powi(attempt as i32))
        .min(self.max_delay.as_secs_f64());

        let delay = if self.jitter_factor > 0.0 {
            let spread = self.jitter_factor * exponential;
            exponential + rng.random_range(-spread..=spread)
        } else {
            exponential
        };

        Duration::from_secs_f64(delay.max(0.0))
    }

    /// Decide whether another attempt is allowed after `error` on `attempt`
    pub fn should_retry(&self, attempt: u32, error: &GenerationError) -> bool {
        attempt < self.max_retries && error.is_retryable()
    }

    /// Upper bound on any delay this policy can produce
    pub fn max_possible_delay(&self) -> Duration {
        Duration::from_secs_f64(self.max_delay.as_secs_f64() * (1.0 + self.jitter_factor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorKind;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            exponential_base: 2.0,
            jitter_factor: 0.1,
        }
    }

    #[test]
    fn test_delay_non_negative_and_bounded() {
        let policy = policy();
        let bound = policy.max_possible_delay();

        for attempt in 0..20 {
            let delay = policy.next_delay(attempt);
            assert!(delay >= Duration::ZERO);
            assert!(delay <= bound, "attempt {attempt}: {delay:?} > {bound:?}");
        }
    }

    #[test]
    fn test_delay_grows_then_caps() {
        let mut policy = policy();
        policy.jitter_factor = 0.0;

        assert_eq!(policy.next_delay(0), Duration::from_secs(1));
        assert_eq!(policy.next_delay(1), Duration::from_secs(2));
        assert_eq!(policy.next_delay(2), Duration::from_secs(4));
        // 2^10 seconds would be 1024s, capped at 30s
        assert_eq!(policy.next_delay(10), Duration::from_secs(30));
    }

    #[test]
    fn test_deterministic_with_seeded_rng() {
        let policy = policy();
        let a = policy.next_delay_with_rng(2, &mut StdRng::seed_from_u64(7));
        let b = policy.next_delay_with_rng(2, &mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);
    }

    #[test]
    fn test_jitter_stays_within_band() {
        let policy = policy();
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..100 {
            let delay = policy.next_delay_with_rng(2, &mut rng).as_secs_f64();
            // exponential = 4s, band = [3.6, 4.4]
            assert!((3.6..=4.4).contains(&delay), "delay {delay} out of band");
        }
    }

    #[test]
    fn test_should_retry_respects_max_retries() {
        let policy = policy();
        let err = GenerationError::new(ErrorKind::Unavailable, "down");

        assert!(policy.should_retry(0, &err));
        assert!(policy.should_retry(2, &err));
        assert!(!policy.should_retry(3, &err));
        assert!(!policy.should_retry(10, &err));
    }

    #[test]
    fn test_should_retry_refuses_non_retryable() {
        let policy = policy();

        let invalid = GenerationError::new(ErrorKind::InvalidArgument, "bad prompt");
        assert!(!policy.should_retry(0, &invalid));

        let open = GenerationError::new(ErrorKind::CircuitOpen, "open");
        assert!(!policy.should_retry(0, &open));
    }
}

//! Exponential backoff with jitter for transient provider failures.

use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;

/// Backoff delay before retrying `attempt` (1-based: the delay taken after
/// the first failed attempt is `backoff_delay(1)`).
///
/// `base * 2^(attempt-1)`, capped, with ±25% jitter so synchronized clients
/// do not retry in lockstep.
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let unjittered = config
        .base
        .saturating_mul(2u32.saturating_pow(exponent))
        .min(config.cap);

    let jitter = rand::thread_rng().gen_range(0.75..=1.25);
    unjittered.mul_f64(jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RetryConfig {
        RetryConfig {
            base: Duration::from_millis(500),
            cap: Duration::from_millis(8_000),
            max_attempts: 4,
        }
    }

    #[test]
    fn delay_grows_exponentially_within_jitter_bounds() {
        let config = config();

        for (attempt, nominal_ms) in [(1u32, 500u64), (2, 1_000), (3, 2_000), (4, 4_000)] {
            let delay = backoff_delay(&config, attempt);
            let lo = Duration::from_millis(nominal_ms * 3 / 4);
            let hi = Duration::from_millis(nominal_ms * 5 / 4);
            assert!(
                delay >= lo && delay <= hi,
                "attempt {attempt}: {delay:?} outside [{lo:?}, {hi:?}]"
            );
        }
    }

    #[test]
    fn delay_is_capped() {
        let config = config();
        let delay = backoff_delay(&config, 12);
        assert!(delay <= Duration::from_millis(8_000 * 5 / 4));
    }
}

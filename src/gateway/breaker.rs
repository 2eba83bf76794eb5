//! Per-dependency circuit breaker.
//!
//! Closed admits calls. `failure_threshold` consecutive failures inside
//! `window` trips the breaker to open, which rejects immediately for
//! `open_for`. After that a single half-open probe is admitted: success
//! closes the breaker, failure reopens it.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

use crate::config::BreakerConfig;

/// Observable breaker state, surfaced by `/health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    /// Calls flow normally.
    Closed,
    /// Calls are rejected without touching the dependency.
    Open,
    /// One probe call is in flight.
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    first_failure_at: Option<Instant>,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

/// Rejection issued while the breaker is open.
#[derive(Debug, Clone, Copy)]
pub struct BreakerOpen {
    /// Time until the next probe is admitted.
    pub retry_in: Duration,
}

/// Three-state circuit breaker guarding one external dependency.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: &'static str,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Creates a closed breaker named for its dependency.
    pub fn new(name: &'static str, config: BreakerConfig) -> Self {
        Self {
            name,
            config,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                first_failure_at: None,
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    /// Dependency name this breaker guards.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Current state, transitioning open → half-open if the open interval
    /// has elapsed.
    pub fn state(&self) -> BreakerState {
        let mut inner = self.inner.lock();
        self.refresh(&mut inner);
        inner.state
    }

    /// Asks permission to place one call.
    ///
    /// In half-open state only a single probe is admitted; concurrent
    /// callers are rejected until the probe reports back.
    pub fn try_acquire(&self) -> Result<(), BreakerOpen> {
        let mut inner = self.inner.lock();
        self.refresh(&mut inner);

        match inner.state {
            BreakerState::Closed => Ok(()),
            BreakerState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|at| at.elapsed())
                    .unwrap_or(Duration::ZERO);
                Err(BreakerOpen {
                    retry_in: self.config.open_for.saturating_sub(elapsed),
                })
            }
            BreakerState::HalfOpen => {
                if inner.probe_in_flight {
                    Err(BreakerOpen {
                        retry_in: Duration::ZERO,
                    })
                } else {
                    inner.probe_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    /// Records a successful call, closing the breaker.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state != BreakerState::Closed {
            tracing::info!(breaker = self.name, "circuit breaker closed");
        }
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.first_failure_at = None;
        inner.opened_at = None;
        inner.probe_in_flight = false;
    }

    /// Records a failed call, tripping or reopening the breaker as needed.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();

        match inner.state {
            BreakerState::HalfOpen => {
                tracing::warn!(breaker = self.name, "probe failed, breaker reopened");
                inner.state = BreakerState::Open;
                inner.opened_at = Some(Instant::now());
                inner.probe_in_flight = false;
            }
            BreakerState::Closed => {
                let now = Instant::now();
                // Failures outside the window restart the count.
                let window_expired = inner
                    .first_failure_at
                    .map(|at| now.duration_since(at) > self.config.window)
                    .unwrap_or(true);
                if window_expired {
                    inner.consecutive_failures = 0;
                    inner.first_failure_at = Some(now);
                }

                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    tracing::warn!(
                        breaker = self.name,
                        failures = inner.consecutive_failures,
                        "circuit breaker tripped"
                    );
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(now);
                }
            }
            BreakerState::Open => {}
        }
    }

    fn refresh(&self, inner: &mut BreakerInner) {
        if inner.state == BreakerState::Open {
            let expired = inner
                .opened_at
                .map(|at| at.elapsed() >= self.config.open_for)
                .unwrap_or(true);
            if expired {
                inner.state = BreakerState::HalfOpen;
                inner.probe_in_flight = false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> BreakerConfig {
        BreakerConfig {
            failure_threshold: 3,
            window: Duration::from_secs(60),
            open_for: Duration::from_millis(20),
        }
    }

    #[test]
    fn closed_breaker_admits_calls() {
        let breaker = CircuitBreaker::new("test", fast_config());
        assert!(breaker.try_acquire().is_ok());
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn trips_after_threshold_consecutive_failures() {
        let breaker = CircuitBreaker::new("test", fast_config());

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Closed);

        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(breaker.try_acquire().is_err());
    }

    #[test]
    fn success_resets_failure_count() {
        let breaker = CircuitBreaker::new("test", fast_config());

        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        breaker.record_failure();

        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn open_rejects_with_retry_hint() {
        let breaker = CircuitBreaker::new("test", fast_config());
        for _ in 0..3 {
            breaker.record_failure();
        }

        let rejection = breaker.try_acquire().unwrap_err();
        assert!(rejection.retry_in <= Duration::from_millis(20));
    }

    #[test]
    fn half_open_admits_single_probe() {
        let breaker = CircuitBreaker::new("test", fast_config());
        for _ in 0..3 {
            breaker.record_failure();
        }

        std::thread::sleep(Duration::from_millis(25));
        assert_eq!(breaker.state(), BreakerState::HalfOpen);

        assert!(breaker.try_acquire().is_ok());
        // Second caller is held back while the probe is out.
        assert!(breaker.try_acquire().is_err());
    }

    #[test]
    fn probe_success_closes() {
        let breaker = CircuitBreaker::new("test", fast_config());
        for _ in 0..3 {
            breaker.record_failure();
        }
        std::thread::sleep(Duration::from_millis(25));

        assert!(breaker.try_acquire().is_ok());
        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn probe_failure_reopens() {
        let breaker = CircuitBreaker::new("test", fast_config());
        for _ in 0..3 {
            breaker.record_failure();
        }
        std::thread::sleep(Duration::from_millis(25));

        assert!(breaker.try_acquire().is_ok());
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
    }
}

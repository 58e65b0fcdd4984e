//! Circuit breaker for merge strategies.
//!
//! A strategy that keeps failing on this host (missing encoder, broken
//! filter) is skipped for a while instead of paying its timeout on every run.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

/// Circuit breaker states.
#[derive(Clone, Debug, PartialEq)]
pub enum CircuitState {
    /// Normal operation, counting consecutive failures
    Closed { failures: u32 },
    /// Failing fast
    Open { opened_at: Instant },
    /// One trial call allowed after the recovery period
    HalfOpen,
}

/// Consecutive-failure circuit breaker.
#[derive(Clone, Debug)]
pub struct CircuitBreaker {
    state: Arc<RwLock<CircuitState>>,
    failure_threshold: u32,
    recovery_timeout: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            state: Arc::new(RwLock::new(CircuitState::Closed { failures: 0 })),
            failure_threshold: failure_threshold.max(1),
            recovery_timeout,
        }
    }

    /// Check if an attempt is allowed.
    pub fn allow(&self) -> bool {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        match *state {
            CircuitState::Closed { .. } | CircuitState::HalfOpen => true,
            CircuitState::Open { opened_at } => {
                if opened_at.elapsed() >= self.recovery_timeout {
                    *state = CircuitState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful attempt.
    pub fn success(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        *state = CircuitState::Closed { failures: 0 };
    }

    /// Record a failed attempt.
    pub fn failure(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        *state = match *state {
            CircuitState::Closed { failures } if failures + 1 < self.failure_threshold => {
                CircuitState::Closed {
                    failures: failures + 1,
                }
            }
            CircuitState::Open { opened_at } => CircuitState::Open { opened_at },
            _ => CircuitState::Open {
                opened_at: Instant::now(),
            },
        };
    }

    /// Current state for monitoring.
    pub fn state(&self) -> CircuitState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state(), CircuitState::Open { .. })
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(300))
    }
}

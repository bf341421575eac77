//! # Circuit Breaker Module
//!
//! Stops calling the recipe API after repeated failures so a struggling
//! upstream is not hammered with retries.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::config::RecoveryConfig;

/// Failure bookkeeping guarded by a single lock
#[derive(Debug, Default)]
struct BreakerState {
    failure_count: u32,
    last_failure_time: Option<Instant>,
}

/// Circuit breaker for recipe API requests
///
/// # State Machine
///
/// - **Closed**: requests pass through
/// - **Open**: `circuit_breaker_threshold` consecutive failures; requests fail fast
/// - after `circuit_breaker_reset_secs` the breaker closes again and the next
///   request tests the upstream again
#[derive(Debug)]
pub struct CircuitBreaker {
    state: Mutex<BreakerState>,
    threshold: u32,
    reset_after: Duration,
}

impl CircuitBreaker {
    pub fn new(config: &RecoveryConfig) -> Self {
        Self {
            state: Mutex::new(BreakerState::default()),
            threshold: config.circuit_breaker_threshold,
            reset_after: Duration::from_secs(config.circuit_breaker_reset_secs),
        }
    }

    /// Whether requests should currently be refused
    pub fn is_open(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if state.failure_count < self.threshold {
            return false;
        }

        match state.last_failure_time {
            Some(last) if last.elapsed() < self.reset_after => true,
            _ => {
                info!("Recipe API circuit breaker reset after cooldown");
                *state = BreakerState::default();
                false
            }
        }
    }

    pub fn record_failure(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.failure_count += 1;
        state.last_failure_time = Some(Instant::now());

        if state.failure_count == self.threshold {
            warn!(failures = state.failure_count, "Recipe API circuit breaker opened");
        }
    }

    pub fn record_success(&self) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = BreakerState::default();
    }

    pub fn failure_count(&self) -> u32 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .failure_count
    }
}

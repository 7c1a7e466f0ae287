//! # Circuit Breaker
//!
//! Guards every remote cache call. Three states:
//!
//! ```text
//! Closed  → Open:     consecutive failures reach failure_threshold
//! Open    → HalfOpen: cooldown elapsed since the last recorded failure
//! HalfOpen → Closed:  the single trial call succeeds
//! HalfOpen → Open:    the trial call (or any other recorded failure) fails, cooldown restarts
//! ```
//!
//! While Open, calls are rejected with [`CacheError::BreakerOpen`] without
//! running the operation. In HalfOpen exactly one trial call is in flight at a
//! time; concurrent callers are rejected until it settles. Every state change
//! releases the trial slot, so an outcome arriving after the state moved on
//! never holds it.

use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::clock::{duration_ms, system_clock, SharedClock};
use crate::error::{CacheError, Result};

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Normal operation - all calls are allowed through
    Closed,
    /// Failure mode - all calls fail fast without executing
    Open,
    /// Testing recovery - one trial call allowed through
    HalfOpen,
}

/// Thresholds for the breaker. Both are independently tunable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// Time spent Open before a trial call is admitted
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(60),
        }
    }
}

/// Point-in-time view of the breaker for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CircuitBreakerSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub last_failure_at: Option<u64>,
    pub failure_threshold: u32,
    pub cooldown_ms: u64,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure_at: Option<u64>,
    trial_in_flight: bool,
    /// Bumped on every state change; a permit from an older generation is not a trial
    generation: u64,
}

/// Consecutive-failure circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Component name for logging
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
    clock: SharedClock,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self::with_clock(name, config, system_clock())
    }

    pub fn with_clock(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        clock: SharedClock,
    ) -> Self {
        let name = name.into();
        info!(
            component = %name,
            failure_threshold = config.failure_threshold,
            cooldown_ms = duration_ms(config.cooldown),
            "Circuit breaker initialized"
        );

        Self {
            name,
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                last_failure_at: None,
                trial_in_flight: false,
                generation: 0,
            }),
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        // State stays consistent even if a holder panicked: every update is a
        // handful of plain field writes.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn cooldown_elapsed(&self, inner: &BreakerInner) -> bool {
        match inner.last_failure_at {
            Some(at) => {
                self.clock.now_ms().saturating_sub(at) >= duration_ms(self.config.cooldown)
            }
            None => true,
        }
    }

    /// Current state. An Open circuit whose cooldown has elapsed reports HalfOpen.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.lock();
        if inner.state == CircuitState::Open && self.cooldown_elapsed(&inner) {
            self.transition(&mut inner, CircuitState::HalfOpen);
        }
        inner.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let state = self.state();
        let inner = self.lock();
        CircuitBreakerSnapshot {
            state,
            consecutive_failures: inner.consecutive_failures,
            last_failure_at: inner.last_failure_at,
            failure_threshold: self.config.failure_threshold,
            cooldown_ms: duration_ms(self.config.cooldown),
        }
    }

    /// Runs `operation` under breaker protection.
    ///
    /// Fails with [`CacheError::BreakerOpen`] without invoking `operation` when the
    /// circuit rejects the call; otherwise records the outcome and returns it.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let permit = self.acquire()?;
        let result = operation().await;
        match &result {
            Ok(_) => permit.succeed(),
            Err(err) => permit.fail(err),
        }
        result
    }

    fn acquire(&self) -> Result<Permit<'_>> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Ok(Permit::regular(self)),
            CircuitState::Open => {
                if self.cooldown_elapsed(&inner) {
                    self.transition(&mut inner, CircuitState::HalfOpen);
                    inner.trial_in_flight = true;
                    Ok(Permit::trial(self, inner.generation))
                } else {
                    debug!(component = %self.name, "Circuit open, rejecting call");
                    Err(CacheError::BreakerOpen)
                }
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    debug!(component = %self.name, "Trial call in flight, rejecting call");
                    Err(CacheError::BreakerOpen)
                } else {
                    inner.trial_in_flight = true;
                    Ok(Permit::trial(self, inner.generation))
                }
            }
        }
    }

    /// Records a success observed outside `execute` (e.g. a health probe).
    pub fn record_success(&self) {
        let mut inner = self.lock();
        self.on_success(&mut inner, false);
    }

    /// Records a failure observed outside `execute` (e.g. a health probe).
    pub fn record_failure(&self) {
        let mut inner = self.lock();
        self.on_failure(&mut inner);
    }

    fn on_success(&self, inner: &mut BreakerInner, trial: bool) {
        match inner.state {
            CircuitState::Closed => inner.consecutive_failures = 0,
            CircuitState::HalfOpen if trial => {
                inner.consecutive_failures = 0;
                self.transition(inner, CircuitState::Closed);
            }
            // Out-of-band successes do not close an Open circuit; only a trial does.
            CircuitState::HalfOpen | CircuitState::Open => {}
        }
    }

    fn on_failure(&self, inner: &mut BreakerInner) {
        let now = self.clock.now_ms();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        match inner.state {
            CircuitState::Closed => {
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.last_failure_at = Some(now);
                    self.transition(inner, CircuitState::Open);
                }
            }
            // Any failure while half-open reopens, whether or not it came from the trial
            CircuitState::HalfOpen => {
                inner.last_failure_at = Some(now);
                self.transition(inner, CircuitState::Open);
            }
            CircuitState::Open => {}
        }
    }

    fn transition(&self, inner: &mut BreakerInner, to: CircuitState) {
        if inner.state == to {
            return;
        }
        let from = inner.state;
        inner.state = to;
        // Outstanding trial permits belong to the previous state
        inner.trial_in_flight = false;
        inner.generation = inner.generation.wrapping_add(1);
        match to {
            CircuitState::Open => warn!(
                component = %self.name,
                ?from,
                consecutive_failures = inner.consecutive_failures,
                "Circuit breaker opened"
            ),
            _ => info!(component = %self.name, ?from, ?to, "Circuit breaker transition"),
        }
    }
}

/// Admission ticket for one call. A trial permit dropped without an outcome
/// (the caller's future was cancelled) frees the trial slot again.
///
/// A trial permit only counts as the trial while the breaker is still in the
/// generation that issued it. Once the state has moved on, its outcome is
/// recorded like any other call.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    /// Generation of the trial slot this permit holds, if any
    trial: Option<u64>,
    settled: bool,
}

impl<'a> Permit<'a> {
    fn regular(breaker: &'a CircuitBreaker) -> Self {
        Self {
            breaker,
            trial: None,
            settled: false,
        }
    }

    fn trial(breaker: &'a CircuitBreaker, generation: u64) -> Self {
        Self {
            breaker,
            trial: Some(generation),
            settled: false,
        }
    }

    fn is_current_trial(&self, inner: &BreakerInner) -> bool {
        self.trial == Some(inner.generation) && inner.trial_in_flight
    }

    fn succeed(mut self) {
        self.settled = true;
        let mut inner = self.breaker.lock();
        let trial = self.is_current_trial(&inner);
        self.breaker.on_success(&mut inner, trial);
    }

    fn fail(mut self, err: &CacheError) {
        self.settled = true;
        debug!(component = %self.breaker.name, error = %err, "Breaker recorded failure");
        let mut inner = self.breaker.lock();
        self.breaker.on_failure(&mut inner);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if self.settled || self.trial.is_none() {
            return;
        }
        let mut inner = self.breaker.lock();
        if self.is_current_trial(&inner) {
            inner.trial_in_flight = false;
        }
    }
}

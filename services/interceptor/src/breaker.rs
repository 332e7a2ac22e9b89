//! Three-state circuit breaker.
//!
//! Generic guard around an async fallible operation.  Tracks consecutive
//! failures, opens at a threshold, admits a bounded number of probes after
//! a cooldown, and closes again on probe success.  When the circuit refuses
//! to invoke, callers receive [`Verdict::Rejected`] instead of a value --
//! distinguishable from every result the protected operation can produce.
//!
//! # States
//! - `Closed` (initial): every call invokes the operation.  Success resets
//!   a non-zero failure count; failure increments it and opens the circuit
//!   at `threshold`.
//! - `Open`: calls are rejected until `reset_timeout` has elapsed since the
//!   last failure, then the circuit moves to `HalfOpen` and the triggering
//!   call proceeds as a probe.
//! - `HalfOpen`: at most `half_open_max_attempts` probes are admitted
//!   (in-flight probes count against the budget).  Enough successes close
//!   the circuit with cleared counters; any failure reopens it.
//!
//! Errors from the operation are accounted as failures and then propagated
//! unchanged to the caller.
//!
//! State lives behind a `std::sync::Mutex`: the service runs on the
//! multi-threaded runtime, and the critical sections never span an await.

use std::future::Future;
use std::sync::Mutex;
use tokio::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Externally observable breaker state (health and metrics).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    /// Lowercase wire string used by `/health` and `/metrics`.
    pub fn as_str(self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Outcome of [`CircuitBreaker::execute`] when the operation did not error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict<T> {
    /// The operation ran and returned a value.
    Ran(T),
    /// The circuit refused to invoke the operation.
    Rejected,
}

// ---------------------------------------------------------------------------
// Breaker
// ---------------------------------------------------------------------------

/// Largest permitted half-open probe budget.
const HALF_OPEN_ATTEMPT_CAP: u32 = 3;

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    probes_in_flight: u32,
    last_failure: Option<Instant>,
}

/// A three-state circuit breaker guarding one logical operation.
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    reset_timeout: Duration,
    half_open_max_attempts: u32,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a closed breaker.
    ///
    /// `half_open_max_attempts` is clamped to `1..=3`.
    pub fn new(threshold: u32, reset_timeout: Duration, half_open_max_attempts: u32) -> Self {
        CircuitBreaker {
            threshold: threshold.max(1),
            reset_timeout,
            half_open_max_attempts: half_open_max_attempts.clamp(1, HALF_OPEN_ATTEMPT_CAP),
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                probes_in_flight: 0,
                last_failure: None,
            }),
        }
    }

    /// Run `op` under the circuit.
    ///
    /// Returns `Ok(Verdict::Ran(value))` on success, `Ok(Verdict::Rejected)`
    /// when the circuit refuses to invoke, and `Err(e)` when the operation
    /// failed (the failure is accounted before the error propagates).
    pub async fn execute<T, E, F, Fut>(&self, op: F) -> Result<Verdict<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.admit() {
            return Ok(Verdict::Rejected);
        }

        match op().await {
            Ok(value) => {
                self.on_success();
                Ok(Verdict::Ran(value))
            }
            Err(e) => {
                self.on_failure();
                Err(e)
            }
        }
    }

    /// Current state, for health and metrics.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Current consecutive-failure count, for metrics.
    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    /// Force the breaker back to `Closed` with all counters cleared.
    ///
    /// Operator control and tests.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.success_count = 0;
        inner.probes_in_flight = 0;
        inner.last_failure = None;
    }

    // -----------------------------------------------------------------------
    // State transitions
    // -----------------------------------------------------------------------

    /// Decide whether a call may invoke the operation, updating state for
    /// the open -> half-open transition and the probe budget.
    fn admit(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let cooled_down = match inner.last_failure {
                    Some(at) => at.elapsed() >= self.reset_timeout,
                    None => true,
                };
                if !cooled_down {
                    return false;
                }
                inner.state = CircuitState::HalfOpen;
                inner.success_count = 0;
                inner.probes_in_flight = 1;
                true
            }
            CircuitState::HalfOpen => {
                if inner.success_count + inner.probes_in_flight >= self.half_open_max_attempts {
                    return false;
                }
                inner.probes_in_flight += 1;
                true
            }
        }
    }

    fn on_success(&self) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => {
                if inner.failure_count > 0 {
                    inner.failure_count = 0;
                }
            }
            CircuitState::HalfOpen => {
                inner.probes_in_flight = inner.probes_in_flight.saturating_sub(1);
                inner.success_count += 1;
                if inner.success_count >= self.half_open_max_attempts {
                    inner.state = CircuitState::Closed;
                    inner.failure_count = 0;
                    inner.success_count = 0;
                    inner.probes_in_flight = 0;
                    inner.last_failure = None;
                }
            }
            // A probe raced with a reopen; its success no longer counts.
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self) {
        let mut inner = self.lock();
        inner.failure_count += 1;
        inner.last_failure = Some(Instant::now());
        match inner.state {
            CircuitState::Closed => {
                if inner.failure_count >= self.threshold {
                    inner.state = CircuitState::Open;
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.success_count = 0;
                inner.probes_in_flight = 0;
            }
            CircuitState::Open => {}
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        self.inner.lock().expect("breaker state mutex poisoned")
    }
}

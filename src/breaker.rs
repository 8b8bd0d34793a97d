// Per-provider circuit breaker.
//
// State machine:
//
//   Closed ──(failure_threshold consecutive failures)──> Open
//   Open ──(cooldown elapsed)──> HalfOpen
//   HalfOpen ──(trial call succeeds)──> Closed
//   HalfOpen ──(trial call fails)──> Open
//
// In HalfOpen exactly one trial call is let through; everyone else fails
// fast until the trial resolves. A call that finds the breaker Open never
// reaches the provider.
//
// All state lives behind a std Mutex scoped to this one breaker. The lock
// is only held to decide and to record, never across the provider call.
// Each state change bumps a generation counter so that an outcome reported
// by a call admitted under an older state can't corrupt the current one.

use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::{info, warn};

/// Thresholds for a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakerConfig {
    /// Consecutive failures in Closed before tripping (default 5)
    pub failure_threshold: u32,
    /// How long to stay Open before allowing a trial call (default 60s)
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half-open",
        }
    }
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned instead of calling the provider when the breaker rejects a call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("circuit breaker {state} for provider {provider}")]
pub struct BreakerOpen {
    pub provider: String,
    pub state: BreakerState,
}

struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
    generation: u64,
}

pub struct CircuitBreaker {
    provider: String,
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(provider: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            provider: provider.into(),
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                trial_in_flight: false,
                generation: 0,
            }),
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Current state, applying the Open → HalfOpen transition if the
    /// cooldown has elapsed.
    pub fn state(&self) -> BreakerState {
        let mut inner = self.lock();
        self.refresh(&mut inner);
        inner.state
    }

    /// Run `call` through the breaker.
    ///
    /// If the breaker rejects the call, `call` is never invoked and a
    /// [`BreakerOpen`] error is returned. Otherwise the outcome of `call`
    /// is recorded and passed through unchanged.
    pub async fn call<T, F, Fut>(&self, call: F) -> anyhow::Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let permit = self.try_acquire()?;
        let result = call().await;
        match &result {
            Ok(_) => permit.success(),
            Err(_) => permit.failure(),
        }
        result
    }

    /// Ask for permission to make one call.
    pub fn try_acquire(&self) -> Result<Permit<'_>, BreakerOpen> {
        let mut inner = self.lock();
        self.refresh(&mut inner);

        match inner.state {
            BreakerState::Closed => Ok(Permit::new(self, inner.generation, false)),
            BreakerState::HalfOpen if !inner.trial_in_flight => {
                inner.trial_in_flight = true;
                Ok(Permit::new(self, inner.generation, true))
            }
            state => Err(BreakerOpen {
                provider: self.provider.clone(),
                state,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock leaves plain counters behind;
        // nothing in them can be half-updated in a harmful way.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn refresh(&self, inner: &mut Inner) {
        if inner.state != BreakerState::Open {
            return;
        }
        let cooled_down = inner
            .opened_at
            .is_some_and(|at| at.elapsed() >= self.config.cooldown);
        if cooled_down {
            self.transition(inner, BreakerState::HalfOpen);
        }
    }

    fn transition(&self, inner: &mut Inner, to: BreakerState) {
        let from = inner.state;
        inner.state = to;
        inner.generation += 1;
        inner.trial_in_flight = false;
        match to {
            BreakerState::Open => {
                inner.opened_at = Some(Instant::now());
                warn!(
                    provider = %self.provider,
                    from = %from,
                    failures = inner.consecutive_failures,
                    cooldown_secs = self.config.cooldown.as_secs(),
                    "Circuit breaker opened"
                );
            }
            BreakerState::HalfOpen => {
                info!(provider = %self.provider, "Circuit breaker half-open, allowing trial call");
            }
            BreakerState::Closed => {
                inner.consecutive_failures = 0;
                inner.opened_at = None;
                info!(provider = %self.provider, from = %from, "Circuit breaker closed");
            }
        }
    }

    fn record(&self, generation: u64, trial: bool, success: bool) {
        let mut inner = self.lock();
        if inner.generation != generation {
            // Admitted under a state that no longer exists.
            if trial {
                inner.trial_in_flight = false;
            }
            return;
        }

        match (inner.state, success) {
            (BreakerState::Closed, true) => inner.consecutive_failures = 0,
            (BreakerState::Closed, false) => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    self.transition(&mut inner, BreakerState::Open);
                }
            }
            (BreakerState::HalfOpen, true) => self.transition(&mut inner, BreakerState::Closed),
            (BreakerState::HalfOpen, false) => self.transition(&mut inner, BreakerState::Open),
            (BreakerState::Open, _) => {}
        }
    }

    fn release_trial(&self, generation: u64) {
        let mut inner = self.lock();
        if inner.generation == generation {
            inner.trial_in_flight = false;
        }
    }
}

/// Permission for exactly one call. Report the outcome with
/// [`Permit::success`] or [`Permit::failure`]; dropping it unreported
/// (e.g. the caller was cancelled) releases a HalfOpen trial slot without
/// counting as either.
pub struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    trial: bool,
    reported: bool,
}

impl<'a> Permit<'a> {
    fn new(breaker: &'a CircuitBreaker, generation: u64, trial: bool) -> Self {
        Self {
            breaker,
            generation,
            trial,
            reported: false,
        }
    }

    pub fn success(mut self) {
        self.reported = true;
        self.breaker.record(self.generation, self.trial, true);
    }

    pub fn failure(mut self) {
        self.reported = true;
        self.breaker.record(self.generation, self.trial, false);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.reported && self.trial {
            self.breaker.release_trial(self.generation);
        }
    }
}

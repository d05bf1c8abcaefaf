//! Circuit breaker guarding calls to the backend and the delegate path.
//!
//! - **Closed**: calls pass; each failure increments a counter.
//! - **Open**: once the counter reaches the threshold, calls are rejected
//!   with [`ProviderError::Unavailable`] until the cooldown elapses.
//! - **HalfOpen**: the first call after the cooldown is let through as a
//!   trial. Success resets the counter to zero; failure reopens the circuit.
//!
//! State is local to one process. Time comes from an injected [`Clock`] so
//! tests can move it forward by hand.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use threadwise_config::BreakerConfig;
use threadwise_core::error::ProviderError;
use tracing::{info, warn};

/// Source of monotonic time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// The real monotonic clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *self.offset.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Default)]
struct Inner {
    failures: u32,
    last_failure: Option<Instant>,
    /// Set while the post-cooldown trial call is running
    trial_started: Option<Instant>,
}

pub struct CircuitBreaker {
    name: String,
    threshold: u32,
    cooldown: Duration,
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, threshold: u32, cooldown: Duration) -> Self {
        Self {
            name: name.into(),
            threshold: threshold.max(1),
            cooldown,
            clock: Arc::new(SystemClock),
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn from_config(name: impl Into<String>, config: &BreakerConfig) -> Self {
        Self::new(name, config.failure_threshold, Duration::from_secs(config.cooldown_secs))
    }

    /// Replace the clock (tests use [`ManualClock`]).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn cooled_down(&self, since: Option<Instant>, now: Instant) -> bool {
        since.is_none_or(|t| now.saturating_duration_since(t) >= self.cooldown)
    }

    /// Current state, without side effects.
    pub fn state(&self) -> BreakerState {
        let inner = self.lock();
        if inner.failures < self.threshold {
            BreakerState::Closed
        } else if self.cooled_down(inner.last_failure, self.clock.now()) {
            BreakerState::HalfOpen
        } else {
            BreakerState::Open
        }
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().failures
    }

    /// Ask permission to make a call.
    ///
    /// While open, rejects without side effects. After the cooldown, admits
    /// exactly one trial; others are rejected until that trial reports. A
    /// trial that never reports is superseded after another cooldown.
    pub fn check(&self) -> std::result::Result<(), ProviderError> {
        let now = self.clock.now();
        let mut inner = self.lock();

        if inner.failures < self.threshold {
            return Ok(());
        }

        if !self.cooled_down(inner.last_failure, now) {
            let remaining = inner
                .last_failure
                .map(|t| self.cooldown.saturating_sub(now.saturating_duration_since(t)))
                .unwrap_or_default();
            return Err(ProviderError::Unavailable(format!(
                "{} circuit open after {} consecutive failures; retry in {}s",
                self.name,
                inner.failures,
                remaining.as_secs().max(1)
            )));
        }

        if inner.trial_started.is_some() && !self.cooled_down(inner.trial_started, now) {
            return Err(ProviderError::Unavailable(format!(
                "{} circuit half-open; trial call in progress",
                self.name
            )));
        }

        info!(breaker = %self.name, "Cooldown elapsed, admitting trial call");
        inner.trial_started = Some(now);
        Ok(())
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        if inner.failures >= self.threshold {
            info!(breaker = %self.name, "Trial call succeeded, closing circuit");
        }
        *inner = Inner::default();
    }

    pub fn record_failure(&self) {
        let now = self.clock.now();
        let mut inner = self.lock();
        inner.failures = inner.failures.saturating_add(1);
        inner.last_failure = Some(now);
        let was_trial = inner.trial_started.take().is_some();

        if was_trial {
            warn!(breaker = %self.name, "Trial call failed, reopening circuit");
        } else if inner.failures == self.threshold {
            warn!(
                breaker = %self.name,
                failures = inner.failures,
                cooldown_secs = self.cooldown.as_secs(),
                "Failure threshold reached, opening circuit"
            );
        }
    }

    /// Run `op` under the breaker, recording its outcome.
    pub async fn call<T, F, Fut>(&self, op: F) -> std::result::Result<T, ProviderError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, ProviderError>>,
    {
        self.check()?;
        match op().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(e) => {
                self.record_failure();
                Err(e)
            }
        }
    }
}

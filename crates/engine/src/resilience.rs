// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retry with jittered exponential backoff, plus a per-backend-type
//! circuit breaker.
//!
//! The two compose around `Backend::send`: the breaker short-circuits a
//! backend type that keeps failing, and the retry loop treats both
//! cancellation and an open circuit as permanent, so neither burns the
//! retry budget. User cancellation never counts as a breaker failure.

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use gf_adapters::backend::{Backend, BackendError, Message, Response};
use gf_core::BackendType;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors from a resilience-wrapped send.
#[derive(Debug, Error)]
pub enum ResilienceError {
    #[error("circuit breaker is open")]
    CircuitOpen,
    #[error("cancelled")]
    Cancelled,
    #[error("retries exhausted: {0}")]
    RetriesExhausted(BackendError),
}

/// Exponential backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    pub initial: Duration,
    pub max_interval: Duration,
    pub multiplier: f64,
    /// +/- jitter fraction applied to every interval.
    pub randomization_factor: f64,
    /// Cumulative ceiling; once exceeded, the next retry is refused.
    pub max_elapsed: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(100),
            max_interval: Duration::from_secs(10),
            multiplier: 2.0,
            randomization_factor: 0.5,
            max_elapsed: Duration::from_secs(120),
        }
    }
}

impl RetryConfig {
    /// A config that admits exactly one attempt; used where the caller
    /// wants breaker semantics without retries.
    pub fn no_retries() -> Self {
        Self {
            max_elapsed: Duration::ZERO,
            ..Self::default()
        }
    }

    fn to_backoff(self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial,
            current_interval: self.initial,
            randomization_factor: self.randomization_factor,
            multiplier: self.multiplier,
            max_interval: self.max_interval,
            max_elapsed_time: Some(self.max_elapsed),
            ..ExponentialBackoff::default()
        }
    }
}

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    /// Probes admitted in the current half-open window.
    probes: u32,
}

/// Three-state circuit breaker: trips after consecutive failures, stays
/// open for a cool-down, then admits a bounded number of probes.
pub struct CircuitBreaker {
    trip_threshold: u32,
    open_for: Duration,
    half_open_probes: u32,
    inner: Mutex<BreakerInner>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::with_settings(5, Duration::from_secs(30), 3)
    }
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(trip_threshold: u32, open_for: Duration, half_open_probes: u32) -> Self {
        Self {
            trip_threshold,
            open_for,
            half_open_probes,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probes: 0,
            }),
        }
    }

    /// Admission check before touching the backend. An expired open
    /// window transitions to half-open here.
    pub fn acquire(&self) -> Result<(), ResilienceError> {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed => Ok(()),
            BreakerState::Open => {
                let expired = inner
                    .opened_at
                    .is_some_and(|at| at.elapsed() >= self.open_for);
                if expired {
                    inner.state = BreakerState::HalfOpen;
                    inner.probes = 1;
                    Ok(())
                } else {
                    Err(ResilienceError::CircuitOpen)
                }
            }
            BreakerState::HalfOpen => {
                if inner.probes < self.half_open_probes {
                    inner.probes += 1;
                    Ok(())
                } else {
                    Err(ResilienceError::CircuitOpen)
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.probes = 0;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::HalfOpen => {
                // A failed probe reopens immediately.
                inner.state = BreakerState::Open;
                inner.opened_at = Some(Instant::now());
                inner.probes = 0;
            }
            BreakerState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.trip_threshold {
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            BreakerState::Open => {}
        }
    }

    /// Cancellation releases the admission without touching the failure
    /// count or state.
    pub fn record_cancelled(&self) {
        let mut inner = self.inner.lock();
        if inner.state == BreakerState::HalfOpen {
            inner.probes = inner.probes.saturating_sub(1);
        }
    }

    /// Last observed state; an expired open window still reads `Open`
    /// until the next `acquire`.
    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }
}

/// Lazily constructed breaker per backend type; all backends of one
/// type share one breaker.
#[derive(Default)]
pub struct BreakerRegistry {
    breakers: Mutex<HashMap<BackendType, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn breaker(&self, backend_type: BackendType) -> Arc<CircuitBreaker> {
        self.breakers
            .lock()
            .entry(backend_type)
            .or_insert_with(|| Arc::new(CircuitBreaker::new()))
            .clone()
    }
}

/// Send through breaker and retry loop.
///
/// Permanent outcomes, returned without consuming the retry budget:
/// user cancellation (checked before and during every attempt) and an
/// open circuit. Everything else backs off and retries until the
/// elapsed ceiling.
pub async fn send_with_retry(
    token: &CancellationToken,
    breaker: &CircuitBreaker,
    retry: &RetryConfig,
    backend: &mut dyn Backend,
    msg: &Message,
) -> Result<Response, ResilienceError> {
    let mut policy = retry.to_backoff();
    loop {
        if token.is_cancelled() {
            return Err(ResilienceError::Cancelled);
        }
        breaker.acquire()?;

        match backend.send(token, msg.clone()).await {
            Ok(response) => {
                breaker.record_success();
                return Ok(response);
            }
            Err(e) if e.is_cancelled() => {
                breaker.record_cancelled();
                return Err(ResilienceError::Cancelled);
            }
            Err(e) => {
                breaker.record_failure();
                let Some(delay) = policy.next_backoff() else {
                    return Err(ResilienceError::RetriesExhausted(e));
                };
                tracing::debug!(
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "backend send failed, backing off"
                );
                tokio::select! {
                    _ = token.cancelled() => return Err(ResilienceError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "resilience_tests.rs"]
mod tests;

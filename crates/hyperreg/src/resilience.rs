//! Resilience Layer: retry with backoff, circuit breaking, and timeouts.
//!
//! Grounded on the sliding-failure-window circuit breaker shape used for
//! bridge calls elsewhere in the corpus, re-expressed here with
//! `std::time::Instant`/`tokio` instead of that crate's allocator-free
//! kernel idiom.

use std::future::Future;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use rand::Rng;

use crate::error::RegistryError;

/// Exponential backoff retry policy.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Base delay before the first retry.
    pub base: Duration,
    /// Multiplier applied to the delay after each attempt.
    pub multiplier: f64,
    /// Upper bound on the computed delay.
    pub max_delay: Duration,
    /// Maximum number of retry attempts (not counting the initial try).
    pub max_retries: u32,
    /// Multiplicative jitter factor, e.g. `0.1` = ±10%.
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(300),
            max_retries: 5,
            jitter_factor: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Compute the delay before attempt number `attempt` (0-indexed),
    /// including jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let raw = self.base.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = raw.min(self.max_delay.as_secs_f64());
        let jitter_span = capped * self.jitter_factor;
        let jitter = rand::thread_rng().gen_range(-jitter_span..=jitter_span);
        Duration::from_secs_f64((capped + jitter).max(0.0))
    }
}

/// Whether an error is eligible for retry. `ValidationError`/`ConflictError`
/// are never retried; timeouts and storage failures are.
pub fn is_retryable(err: &RegistryError) -> bool {
    matches!(
        err,
        RegistryError::Timeout { .. } | RegistryError::Storage { .. } | RegistryError::CircuitOpen { .. }
    )
}

/// Run `f`, retrying according to `policy` while `classify` reports the
/// returned error as retryable.
pub async fn with_retry<F, Fut, T>(
    policy: RetryPolicy,
    classify: impl Fn(&RegistryError) -> bool,
    mut f: F,
) -> Result<T, RegistryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RegistryError>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.max_retries && classify(&err) => {
                tokio::time::sleep(policy.delay_for(attempt)).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// A single circuit breaker guarding one logical dependency.
pub struct CircuitBreaker {
    failure_threshold: u32,
    recovery_timeout: Duration,
    consecutive_failures: AtomicU32,
    state: Mutex<CircuitState>,
    opened_at: Mutex<Option<Instant>>,
    half_open_probe_in_flight: AtomicU64,
}

impl CircuitBreaker {
    /// Create a breaker with `failure_threshold` consecutive failures
    /// required to trip, and `recovery_timeout` before a half-open probe is
    /// admitted.
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            recovery_timeout,
            consecutive_failures: AtomicU32::new(0),
            state: Mutex::new(CircuitState::Closed),
            opened_at: Mutex::new(None),
            half_open_probe_in_flight: AtomicU64::new(0),
        }
    }

    /// The default breaker per the resilience layer's defaults
    /// (`threshold=5`, `recovery_timeout=60s`).
    pub fn with_defaults() -> Self {
        Self::new(5, Duration::from_secs(60))
    }

    /// Current state, transitioning `Open -> HalfOpen` as a side effect once
    /// `recovery_timeout` has elapsed.
    pub fn state(&self) -> CircuitState {
        let mut state = self.state.lock().unwrap();
        if *state == CircuitState::Open {
            let opened_at = *self.opened_at.lock().unwrap();
            if let Some(opened_at) = opened_at {
                if opened_at.elapsed() >= self.recovery_timeout {
                    *state = CircuitState::HalfOpen;
                }
            }
        }
        *state
    }

    /// Whether a call should be allowed through right now. In `HalfOpen`,
    /// only a single probe is admitted at a time.
    pub fn allow(&self) -> bool {
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => self
                .half_open_probe_in_flight
                .compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok(),
        }
    }

    /// Record a successful call.
    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        *state = CircuitState::Closed;
        *self.opened_at.lock().unwrap() = None;
        self.half_open_probe_in_flight.store(0, Ordering::SeqCst);
    }

    /// Record a failed call, tripping the breaker if `failure_threshold`
    /// consecutive failures have now occurred.
    pub fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        self.half_open_probe_in_flight.store(0, Ordering::SeqCst);
        if failures >= self.failure_threshold {
            *self.state.lock().unwrap() = CircuitState::Open;
            *self.opened_at.lock().unwrap() = Some(Instant::now());
        }
    }
}

/// A registry of circuit breakers, one per logical dependency name.
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, std::sync::Arc<CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            breakers: DashMap::new(),
        }
    }

    /// Get (or lazily create) the breaker for `target`.
    pub fn get(&self, target: &str) -> std::sync::Arc<CircuitBreaker> {
        self.breakers
            .entry(target.to_string())
            .or_insert_with(|| std::sync::Arc::new(CircuitBreaker::with_defaults()))
            .clone()
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Run `f` subject to `timeout`, returning [`RegistryError::Timeout`] if it
/// does not complete in time.
pub async fn with_timeout<F, T>(
    operation: &str,
    timeout: Duration,
    f: F,
) -> Result<T, RegistryError>
where
    F: Future<Output = Result<T, RegistryError>>,
{
    let started = Instant::now();
    match tokio::time::timeout(timeout, f).await {
        Ok(result) => result,
        Err(_) => Err(RegistryError::Timeout {
            operation: operation.to_string(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32 as StdAtomicU32;
    use std::sync::Arc;

    #[tokio::test]
    async fn with_retry_retries_on_retryable_error() {
        let attempts = Arc::new(StdAtomicU32::new(0));
        let policy = RetryPolicy {
            base: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            ..RetryPolicy::default()
        };

        let result = with_retry(policy, is_retryable, || {
            let attempts = attempts.clone();
            async move {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(RegistryError::Timeout {
                        operation: "test".to_string(),
                        elapsed_ms: 0,
                    })
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn with_retry_does_not_retry_validation_errors() {
        let attempts = Arc::new(StdAtomicU32::new(0));
        let result: Result<(), RegistryError> = with_retry(RetryPolicy::default(), is_retryable, || {
            let attempts = attempts.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(RegistryError::validation("x", "bad", uuid::Uuid::nil()))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn breaker_opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        assert_eq!(breaker.state(), CircuitState::Closed);
        for _ in 0..3 {
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow());
    }

    #[test]
    fn breaker_half_opens_after_recovery_timeout_and_closes_on_success() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(1));
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(breaker.allow());
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn breaker_reopens_on_half_open_probe_failure() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(1));
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn with_timeout_surfaces_timeout_error() {
        let result: Result<(), RegistryError> = with_timeout("slow_op", Duration::from_millis(5), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(RegistryError::Timeout { .. })));
    }
}

//! Circuit breaker guarding calls to a flapping dependency.
//!
//! The breaker watches the outcome of every call and "opens" (rejects calls
//! without running them) once consecutive failures reach a threshold, so a
//! dependency that is down does not get hammered.
//!
//! # States
//!
//! - **Closed**: Normal operation. Calls pass through. Consecutive failures are counted.
//! - **Open**: Threshold reached. Calls are rejected until the cool-down elapses.
//! - **HalfOpen**: Cool-down elapsed. A single trial call is let through; its
//!   outcome decides between Closed and Open.
//!
//! Time is measured with [`tokio::time::Instant`], so tests running with a
//! paused clock can drive transitions with `tokio::time::advance`.
//!
//! # Example
//!
//! ```rust
//! use ledgerlink_runtime::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CircuitBreakerConfig::builder()
//!     .name("redis")
//!     .failure_threshold(3)
//!     .timeout(Duration::from_secs(30))
//!     .build();
//!
//! let breaker = CircuitBreaker::new(config);
//!
//! match breaker.call(|| async { Ok::<_, String>("PONG") }).await {
//!     Ok(reply) => println!("dependency answered: {reply}"),
//!     Err(e) => println!("dependency unavailable: {e}"),
//! }
//! # Ok(())
//! # }
//! ```

use crate::metrics::CircuitBreakerMetrics;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::Instant;

const DEFAULT_FAILURE_THRESHOLD: usize = 3;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_SUCCESS_THRESHOLD: usize = 1;

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Name used in logs and metric labels
    pub name: String,
    /// Number of consecutive failures before opening the circuit
    pub failure_threshold: usize,
    /// Cool-down to wait in Open before trying `HalfOpen`
    pub timeout: Duration,
    /// Number of successful trials in `HalfOpen` before closing the circuit
    pub success_threshold: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            timeout: DEFAULT_TIMEOUT,
            success_threshold: DEFAULT_SUCCESS_THRESHOLD,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub const fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder {
            name: None,
            failure_threshold: None,
            timeout: None,
            success_threshold: None,
        }
    }
}

/// Builder for [`CircuitBreakerConfig`].
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfigBuilder {
    name: Option<String>,
    failure_threshold: Option<usize>,
    timeout: Option<Duration>,
    success_threshold: Option<usize>,
}

impl CircuitBreakerConfigBuilder {
    /// Set the breaker name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the failure threshold.
    ///
    /// Circuit opens after this many consecutive failures.
    #[must_use]
    pub const fn failure_threshold(mut self, threshold: usize) -> Self {
        self.failure_threshold = Some(threshold);
        self
    }

    /// Set the cool-down duration.
    ///
    /// How long to stay Open before letting a `HalfOpen` trial through.
    #[must_use]
    pub const fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Set the success threshold.
    ///
    /// Number of successful trials in `HalfOpen` before closing the circuit.
    #[must_use]
    pub const fn success_threshold(mut self, threshold: usize) -> Self {
        self.success_threshold = Some(threshold);
        self
    }

    /// Build the configuration.
    #[must_use]
    pub fn build(self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            name: self.name.unwrap_or_else(|| "default".to_string()),
            failure_threshold: self.failure_threshold.unwrap_or(DEFAULT_FAILURE_THRESHOLD).max(1),
            timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
            success_threshold: self.success_threshold.unwrap_or(DEFAULT_SUCCESS_THRESHOLD).max(1),
        }
    }
}

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Circuit is closed, calls pass through normally
    Closed,
    /// Circuit is open, calls are rejected
    Open,
    /// Circuit is half-open, a single trial call is allowed
    HalfOpen,
}

impl State {
    /// Numeric encoding used by the state gauge.
    #[must_use]
    pub const fn as_gauge(self) -> f64 {
        match self {
            Self::Closed => 0.0,
            Self::HalfOpen => 1.0,
            Self::Open => 2.0,
        }
    }
}

/// Errors from circuit breaker operations.
#[derive(Error, Debug)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open (or a half-open trial is already running), call rejected
    #[error("Circuit breaker is open")]
    Open,
    /// Operation failed
    #[error("Operation failed: {0}")]
    Inner(E),
}

#[derive(Debug)]
struct CircuitBreakerState {
    state: State,
    failure_count: usize,
    success_count: usize,
    last_failure_time: Option<Instant>,
}

/// Clears the half-open trial flag when the trial finishes or is dropped.
struct TrialGuard {
    flag: Option<Arc<AtomicBool>>,
}

impl Drop for TrialGuard {
    fn drop(&mut self) {
        if let Some(flag) = self.flag.take() {
            flag.store(false, Ordering::Release);
        }
    }
}

/// Circuit breaker for a single dependency.
///
/// Cloning is cheap; clones share state.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    config: Arc<CircuitBreakerConfig>,
    state: Arc<RwLock<CircuitBreakerState>>,
    trial_in_flight: Arc<AtomicBool>,
    total_calls: Arc<AtomicU64>,
    total_successes: Arc<AtomicU64>,
    total_failures: Arc<AtomicU64>,
    total_rejections: Arc<AtomicU64>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration.
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config: Arc::new(config),
            state: Arc::new(RwLock::new(CircuitBreakerState {
                state: State::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure_time: None,
            })),
            trial_in_flight: Arc::new(AtomicBool::new(false)),
            total_calls: Arc::new(AtomicU64::new(0)),
            total_successes: Arc::new(AtomicU64::new(0)),
            total_failures: Arc::new(AtomicU64::new(0)),
            total_rejections: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Breaker name from the configuration.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Get the current state of the circuit breaker.
    pub async fn state(&self) -> State {
        self.state.read().await.state
    }

    /// Call an operation through the circuit breaker.
    ///
    /// # Errors
    ///
    /// Returns `CircuitBreakerError::Open` if the circuit rejects the call.
    /// Returns `CircuitBreakerError::Inner` if the operation fails.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        CircuitBreakerMetrics::record_call(&self.config.name);

        let Some(_guard) = self.try_acquire().await else {
            self.total_rejections.fetch_add(1, Ordering::Relaxed);
            CircuitBreakerMetrics::record_rejection(&self.config.name);
            tracing::debug!(breaker = %self.config.name, "Circuit breaker is OPEN, rejecting call");
            return Err(CircuitBreakerError::Open);
        };

        match operation().await {
            Ok(result) => {
                self.on_success().await;
                self.total_successes.fetch_add(1, Ordering::Relaxed);
                Ok(result)
            }
            Err(err) => {
                self.on_failure().await;
                self.total_failures.fetch_add(1, Ordering::Relaxed);
                Err(CircuitBreakerError::Inner(err))
            }
        }
    }

    /// Decide whether a call may proceed.
    ///
    /// Returns a guard when it may; in `HalfOpen` the guard owns the single
    /// trial slot until it is dropped.
    async fn try_acquire(&self) -> Option<TrialGuard> {
        let mut state = self.state.write().await;

        match state.state {
            State::Closed => Some(TrialGuard { flag: None }),
            State::HalfOpen => self.claim_trial(),
            State::Open => {
                let cooled_down = state
                    .last_failure_time
                    .is_some_and(|last| last.elapsed() >= self.config.timeout);
                if !cooled_down {
                    return None;
                }
                tracing::info!(breaker = %self.config.name, "Circuit breaker transitioning OPEN -> HALF_OPEN");
                state.state = State::HalfOpen;
                state.success_count = 0;
                CircuitBreakerMetrics::record_state(&self.config.name, State::HalfOpen.as_gauge());
                self.claim_trial()
            }
        }
    }

    fn claim_trial(&self) -> Option<TrialGuard> {
        self.trial_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| TrialGuard {
                flag: Some(Arc::clone(&self.trial_in_flight)),
            })
    }

    async fn on_success(&self) {
        let mut state = self.state.write().await;

        match state.state {
            State::Closed | State::Open => {
                state.failure_count = 0;
            }
            State::HalfOpen => {
                state.success_count += 1;
                if state.success_count >= self.config.success_threshold {
                    tracing::info!(
                        breaker = %self.config.name,
                        successes = state.success_count,
                        "Circuit breaker transitioning HALF_OPEN -> CLOSED"
                    );
                    state.state = State::Closed;
                    state.failure_count = 0;
                    state.success_count = 0;
                    state.last_failure_time = None;
                    CircuitBreakerMetrics::record_state(&self.config.name, State::Closed.as_gauge());
                }
            }
        }
    }

    async fn on_failure(&self) {
        let mut state = self.state.write().await;
        state.last_failure_time = Some(Instant::now());

        match state.state {
            State::Closed => {
                state.failure_count += 1;
                if state.failure_count >= self.config.failure_threshold {
                    tracing::warn!(
                        breaker = %self.config.name,
                        failures = state.failure_count,
                        threshold = self.config.failure_threshold,
                        "Circuit breaker transitioning CLOSED -> OPEN"
                    );
                    state.state = State::Open;
                    CircuitBreakerMetrics::record_state(&self.config.name, State::Open.as_gauge());
                }
            }
            State::HalfOpen => {
                tracing::warn!(
                    breaker = %self.config.name,
                    "Circuit breaker transitioning HALF_OPEN -> OPEN (recovery failed)"
                );
                state.state = State::Open;
                state.failure_count = 1;
                state.success_count = 0;
                CircuitBreakerMetrics::record_state(&self.config.name, State::Open.as_gauge());
            }
            State::Open => {
                state.failure_count += 1;
            }
        }
    }

    /// Snapshot of call counters.
    #[must_use]
    pub fn stats(&self) -> CircuitBreakerStats {
        CircuitBreakerStats {
            total_calls: self.total_calls.load(Ordering::Relaxed),
            total_successes: self.total_successes.load(Ordering::Relaxed),
            total_failures: self.total_failures.load(Ordering::Relaxed),
            total_rejections: self.total_rejections.load(Ordering::Relaxed),
        }
    }

    /// Reset the circuit breaker to closed state.
    pub async fn reset(&self) {
        let mut state = self.state.write().await;
        tracing::info!(breaker = %self.config.name, "Circuit breaker manually reset to CLOSED");
        state.state = State::Closed;
        state.failure_count = 0;
        state.success_count = 0;
        state.last_failure_time = None;
        CircuitBreakerMetrics::record_state(&self.config.name, State::Closed.as_gauge());
    }
}

/// Call counters of a circuit breaker.
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerStats {
    /// Total number of calls attempted
    pub total_calls: u64,
    /// Total number of successful calls
    pub total_successes: u64,
    /// Total number of failed calls
    pub total_failures: u64,
    /// Total number of rejected calls
    pub total_rejections: u64,
}

impl CircuitBreakerStats {
    /// Calculate rejection rate (0.0 to 1.0).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn rejection_rate(&self) -> f64 {
        if self.total_calls == 0 {
            return 0.0;
        }
        self.total_rejections as f64 / self.total_calls as f64
    }
}

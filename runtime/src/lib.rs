//! # LedgerLink Runtime
//!
//! Resilience building blocks shared by the LedgerLink services.
//!
//! ## Components
//!
//! - **Circuit breaker**: stops hammering a dependency after repeated failures
//!   and lets a single trial call through once a cool-down elapses
//! - **Periodic tasks**: cancellable background loops (health probing,
//!   cache reconciliation) tied to process lifecycle
//! - **Metrics**: Prometheus recorders for the above and for the credential store
//!
//! ## Example
//!
//! ```rust
//! use ledgerlink_runtime::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
//! use ledgerlink_runtime::periodic::PeriodicTask;
//! use std::time::Duration;
//!
//! # async fn example() {
//! let breaker = CircuitBreaker::new(CircuitBreakerConfig::default());
//! let probe = breaker.clone();
//!
//! let task = PeriodicTask::spawn("probe", Duration::from_secs(30), move || {
//!     let breaker = probe.clone();
//!     async move {
//!         let _ = breaker.call(|| async { Ok::<_, String>(()) }).await;
//!     }
//! });
//!
//! task.shutdown().await;
//! # }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

/// Circuit breaker for flapping dependencies
pub mod circuit_breaker;

/// Prometheus metrics for observability
pub mod metrics;

/// Cancellable periodic background tasks
pub mod periodic;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, State};
pub use periodic::PeriodicTask;

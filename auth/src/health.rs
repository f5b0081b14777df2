//! Durable-tier health monitoring.
//!
//! [`HealthMonitor`] probes the durable tier on a fixed interval, routes each
//! probe through a [`CircuitBreaker`], and caches the outcome in an atomic
//! flag. Request paths only ever read the flag.
//!
//! # Trust model
//!
//! | Breaker    | Probing                         | `is_healthy()`       |
//! |------------|---------------------------------|----------------------|
//! | Closed     | every interval                  | last probe result    |
//! | Open       | suppressed until cool-down ends | `false`              |
//! | Half-open  | one trial probe                 | trial result         |
//!
//! The breaker opens after `failure_threshold` consecutive failed probes.
//! Probe errors are logged and counted; they never reach callers.

use crate::config::HealthConfig;
use crate::error::CredentialError;
use crate::providers::{HealthSignal, LivenessProbe};
use ledgerlink_runtime::metrics::CredentialStoreMetrics;
use ledgerlink_runtime::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, PeriodicTask, State};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

struct Inner<P> {
    probe: P,
    breaker: CircuitBreaker,
    healthy: AtomicBool,
    config: HealthConfig,
}

/// Health monitor for the durable credential tier.
///
/// Starts untrusted; the first probe runs as soon as [`start`](Self::start)
/// is called. Cloning is cheap; clones share state.
pub struct HealthMonitor<P> {
    inner: Arc<Inner<P>>,
}

impl<P> Clone for HealthMonitor<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: LivenessProbe + 'static> HealthMonitor<P> {
    /// Create a monitor for `probe`.
    #[must_use]
    pub fn new(probe: P, config: HealthConfig) -> Self {
        let breaker = CircuitBreaker::new(
            CircuitBreakerConfig::builder()
                .name("credential_durable_tier")
                .failure_threshold(config.failure_threshold)
                .timeout(config.cooldown)
                .success_threshold(1)
                .build(),
        );

        Self {
            inner: Arc::new(Inner {
                probe,
                breaker,
                healthy: AtomicBool::new(false),
                config,
            }),
        }
    }

    /// Probe once and update the trust flag.
    ///
    /// Returns the new trust value. While the breaker is open the probe is
    /// not run and the result is `false`.
    pub async fn check(&self) -> bool {
        let inner = &*self.inner;
        let deadline = inner.config.probe_timeout;

        let outcome = inner
            .breaker
            .call(|| async {
                match tokio::time::timeout(deadline, inner.probe.ping()).await {
                    Ok(result) => result,
                    Err(_) => Err(CredentialError::Unavailable(format!(
                        "Probe timed out after {deadline:?}"
                    ))),
                }
            })
            .await;

        let healthy = match outcome {
            Ok(()) => true,
            Err(CircuitBreakerError::Open) => {
                tracing::debug!("Durable tier probe suppressed, circuit open");
                false
            }
            Err(CircuitBreakerError::Inner(e)) => {
                tracing::warn!(error = %e, "Durable tier probe failed");
                false
            }
        };

        let was_healthy = inner.healthy.swap(healthy, Ordering::AcqRel);
        if was_healthy != healthy {
            if healthy {
                tracing::info!("Durable credential tier is healthy");
            } else {
                tracing::warn!("Durable credential tier is unhealthy, serving from cache");
            }
        }
        CredentialStoreMetrics::record_health(healthy);

        healthy
    }

    /// Start probing in the background.
    ///
    /// The first probe runs immediately, then every `probe_interval`.
    #[must_use]
    pub fn start(&self) -> PeriodicTask {
        self.start_with_delay(Duration::ZERO)
    }

    /// Start probing in the background after `initial_delay`.
    #[must_use]
    pub fn start_with_delay(&self, initial_delay: Duration) -> PeriodicTask {
        let monitor = self.clone();
        PeriodicTask::spawn_with_delay(
            "credential_health_probe",
            initial_delay,
            self.inner.config.probe_interval,
            move || {
                let monitor = monitor.clone();
                async move {
                    monitor.check().await;
                }
            },
        )
    }

    /// Current breaker state.
    pub async fn breaker_state(&self) -> State {
        self.inner.breaker.state().await
    }

    /// The probe being monitored.
    #[must_use]
    pub fn probe(&self) -> &P {
        &self.inner.probe
    }
}

impl<P: LivenessProbe> HealthSignal for HealthMonitor<P> {
    fn is_healthy(&self) -> bool {
        self.inner.healthy.load(Ordering::Acquire)
    }
}

impl<P> std::fmt::Debug for HealthMonitor<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthMonitor")
            .field("healthy", &self.inner.healthy.load(Ordering::Acquire))
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::ScriptedProbe;

    fn monitor(probe: &ScriptedProbe) -> HealthMonitor<ScriptedProbe> {
        HealthMonitor::new(probe.clone(), HealthConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_starts_untrusted() {
        let probe = ScriptedProbe::healthy();
        let monitor = monitor(&probe);

        assert!(!monitor.is_healthy());
        assert!(monitor.check().await);
        assert!(monitor.is_healthy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_failure_drops_trust_but_keeps_breaker_closed() {
        let probe = ScriptedProbe::healthy();
        let monitor = monitor(&probe);
        monitor.check().await;

        probe.set_healthy(false);
        assert!(!monitor.check().await);
        assert_eq!(monitor.breaker_state().await, State::Closed);

        probe.set_healthy(true);
        assert!(monitor.check().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_breaker_suppresses_probes_until_cooldown() {
        let probe = ScriptedProbe::unhealthy();
        let monitor = monitor(&probe);

        for _ in 0..3 {
            assert!(!monitor.check().await);
        }
        assert_eq!(monitor.breaker_state().await, State::Open);
        assert_eq!(probe.calls(), 3);

        // Dependency is back, but the cool-down has not elapsed.
        probe.set_healthy(true);
        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(!monitor.check().await);
        assert_eq!(probe.calls(), 3);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(monitor.check().await);
        assert_eq!(probe.calls(), 4);
        assert_eq!(monitor.breaker_state().await, State::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_trial_reopens() {
        let probe = ScriptedProbe::unhealthy();
        let monitor = monitor(&probe);
        for _ in 0..3 {
            monitor.check().await;
        }

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(!monitor.check().await);
        assert_eq!(monitor.breaker_state().await, State::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_probe_counts_as_failure() {
        let probe = ScriptedProbe::healthy().with_delay(Duration::from_secs(5));
        let monitor = monitor(&probe);

        assert!(!monitor.check().await);
    }
}

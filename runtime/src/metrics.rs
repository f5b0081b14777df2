//! Prometheus metrics for the credential service.
//!
//! Covers:
//! - Circuit breaker state and rejections
//! - Periodic background task ticks
//! - Durable tier health and failures
//! - In-process cache fallbacks and reconciliation
//! - Token refresh outcomes
//!
//! Recording is always safe: without an installed recorder the `metrics`
//! macros are no-ops.
//!
//! # Example
//!
//! ```rust,no_run
//! use ledgerlink_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use thiserror::Error;

pub use metrics::{counter, gauge};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus exporter with an HTTP scrape endpoint.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server bound to `addr` once started.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Install the Prometheus recorder and its HTTP listener.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `MetricsError::Install` if the exporter cannot be installed.
    /// A recorder that is already installed is tolerated and logged.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let (recorder, exporter) = PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .build()
            .map_err(|e| MetricsError::Install(e.to_string()))?;
        let handle = recorder.handle();

        match metrics::set_global_recorder(recorder) {
            Ok(()) => {
                tokio::spawn(async move {
                    if let Err(_e) = exporter.await {
                        // ExporterError implements neither Debug nor Display in 0.15.
                        tracing::error!("Metrics exporter stopped");
                    }
                });
                self.handle = Some(handle);
                tracing::info!(addr = %self.addr, "Metrics recorder installed");
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if the recorder was not installed by this server.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn register_metrics() {
    // Circuit breaker
    describe_gauge!(
        "circuit_breaker_state",
        "Current circuit breaker state (0=closed, 1=half-open, 2=open)"
    );
    describe_counter!(
        "circuit_breaker_calls_total",
        "Total number of calls through a circuit breaker"
    );
    describe_counter!(
        "circuit_breaker_rejections_total",
        "Total number of calls rejected by an open circuit"
    );

    // Background tasks
    describe_counter!(
        "periodic_task_ticks_total",
        "Total number of periodic background task executions"
    );

    // Credential store
    describe_gauge!(
        "credential_durable_tier_healthy",
        "Whether the durable credential tier is trusted (1) or not (0)"
    );
    describe_counter!(
        "credential_durable_failures_total",
        "Durable tier operations that failed, by operation"
    );
    describe_counter!(
        "credential_cache_fallbacks_total",
        "Reads served from the in-process cache instead of the durable tier"
    );
    describe_counter!(
        "credential_reconciled_total",
        "Cache entries pushed to the durable tier by reconciliation, by outcome"
    );

    // Credential service
    describe_counter!(
        "credential_refreshes_total",
        "Refresh-token grants performed, by outcome"
    );
}

/// Circuit breaker metrics recorder.
pub struct CircuitBreakerMetrics;

impl CircuitBreakerMetrics {
    /// Record circuit breaker state.
    ///
    /// 0 = Closed, 1 = `HalfOpen`, 2 = Open
    pub fn record_state(breaker: &str, state: f64) {
        gauge!("circuit_breaker_state", "breaker" => breaker.to_string()).set(state);
    }

    /// Record a call attempt.
    pub fn record_call(breaker: &str) {
        counter!("circuit_breaker_calls_total", "breaker" => breaker.to_string()).increment(1);
    }

    /// Record a rejected call.
    pub fn record_rejection(breaker: &str) {
        counter!("circuit_breaker_rejections_total", "breaker" => breaker.to_string()).increment(1);
    }
}

/// Periodic task metrics recorder.
pub struct PeriodicTaskMetrics;

impl PeriodicTaskMetrics {
    /// Record one execution of a periodic task.
    pub fn record_tick(task: &'static str) {
        counter!("periodic_task_ticks_total", "task" => task).increment(1);
    }
}

/// Credential store metrics recorder.
pub struct CredentialStoreMetrics;

impl CredentialStoreMetrics {
    /// Record the durable tier trust signal.
    pub fn record_health(healthy: bool) {
        gauge!("credential_durable_tier_healthy").set(if healthy { 1.0 } else { 0.0 });
    }

    /// Record a failed durable operation (`save`, `get`, `delete`).
    pub fn record_durable_failure(operation: &'static str) {
        counter!("credential_durable_failures_total", "operation" => operation).increment(1);
    }

    /// Record a read served from the in-process cache.
    pub fn record_cache_fallback() {
        counter!("credential_cache_fallbacks_total").increment(1);
    }

    /// Record the outcome of one reconciliation pass.
    pub fn record_reconciliation(succeeded: usize, failed: usize) {
        counter!("credential_reconciled_total", "outcome" => "success").increment(succeeded as u64);
        counter!("credential_reconciled_total", "outcome" => "failure").increment(failed as u64);
    }
}

/// Credential refresh metrics recorder.
pub struct RefreshMetrics;

impl RefreshMetrics {
    /// Record a successful refresh.
    pub fn record_success() {
        counter!("credential_refreshes_total", "outcome" => "success").increment(1);
    }

    /// Record a failed refresh.
    pub fn record_failure() {
        counter!("credential_refreshes_total", "outcome" => "failure").increment(1);
    }
}

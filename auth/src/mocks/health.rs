//! Mock health signal and liveness probe.

use crate::error::{CredentialError, Result};
use crate::providers::{HealthSignal, LivenessProbe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Health signal with a value set by the test.
#[derive(Debug, Clone)]
pub struct StaticHealth {
    healthy: Arc<AtomicBool>,
}

impl StaticHealth {
    /// Create a signal with an initial value.
    #[must_use]
    pub fn new(healthy: bool) -> Self {
        Self {
            healthy: Arc::new(AtomicBool::new(healthy)),
        }
    }

    /// Change the signal.
    pub fn set(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }
}

impl HealthSignal for StaticHealth {
    fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }
}

/// Liveness probe whose answer is set by the test.
#[derive(Debug, Clone)]
pub struct ScriptedProbe {
    healthy: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
    delay: Option<Duration>,
}

impl ScriptedProbe {
    /// Probe that answers successfully.
    #[must_use]
    pub fn healthy() -> Self {
        Self {
            healthy: Arc::new(AtomicBool::new(true)),
            calls: Arc::new(AtomicUsize::new(0)),
            delay: None,
        }
    }

    /// Probe that fails.
    #[must_use]
    pub fn unhealthy() -> Self {
        let probe = Self::healthy();
        probe.set_healthy(false);
        probe
    }

    /// Sleep this long before answering.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Change the answer.
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Number of probes actually run.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl LivenessProbe for ScriptedProbe {
    async fn ping(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CredentialError::Unavailable("scripted probe failure".to_string()))
        }
    }
}

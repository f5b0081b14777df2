//! Durable-tier health traits.

use crate::error::Result;

/// Cheap signal saying whether the durable tier is currently trusted.
///
/// Implementations must answer from cached state: no I/O, no blocking.
pub trait HealthSignal: Send + Sync {
    /// Whether durable reads and writes should be attempted.
    fn is_healthy(&self) -> bool;
}

/// Lightweight liveness check against a dependency.
pub trait LivenessProbe: Send + Sync {
    /// Probe the dependency once.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` if the dependency did not answer as expected.
    fn ping(&self) -> impl std::future::Future<Output = Result<()>> + Send;
}

//! Credential service environment.
//!
//! This module defines the dependencies injected into
//! [`CredentialService`](crate::service::CredentialService).

use crate::providers::{AuthorizationServer, CredentialStore};
use chrono::{DateTime, Utc};

/// Clock abstraction so expiry decisions are testable.
///
/// # Examples
///
/// ```
/// use chrono::{DateTime, Utc};
/// use ledgerlink_auth::environment::Clock;
///
/// struct FixedClock {
///     time: DateTime<Utc>,
/// }
///
/// impl Clock for FixedClock {
///     fn now(&self) -> DateTime<Utc> {
///         self.time
///     }
/// }
/// ```
pub trait Clock: Send + Sync {
    /// Get the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Credential service environment.
///
/// # Type Parameters
///
/// - `S`: Credential store (durable, resilient, or a mock)
/// - `A`: Upstream authorization server
/// - `C`: Clock
#[derive(Clone)]
pub struct CredentialEnvironment<S, A, C = SystemClock>
where
    S: CredentialStore,
    A: AuthorizationServer,
    C: Clock,
{
    /// Credential store.
    pub store: S,

    /// Upstream authorization server.
    pub authorization: A,

    /// Time source.
    pub clock: C,
}

impl<S, A> CredentialEnvironment<S, A, SystemClock>
where
    S: CredentialStore,
    A: AuthorizationServer,
{
    /// Create an environment using the system clock.
    #[must_use]
    pub const fn new(store: S, authorization: A) -> Self {
        Self {
            store,
            authorization,
            clock: SystemClock,
        }
    }
}

impl<S, A, C> CredentialEnvironment<S, A, C>
where
    S: CredentialStore,
    A: AuthorizationServer,
    C: Clock,
{
    /// Replace the clock.
    #[must_use]
    pub fn with_clock<C2: Clock>(self, clock: C2) -> CredentialEnvironment<S, A, C2> {
        CredentialEnvironment {
            store: self.store,
            authorization: self.authorization,
            clock,
        }
    }
}

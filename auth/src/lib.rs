//! # LedgerLink Credentials
//!
//! Delegated-access credentials for the LedgerLink accounting proxy: `OAuth`
//! bearer tokens bound to a local user and an external tenant, kept valid and
//! available even while the durable store is down.
//!
//! ## Features
//!
//! - **Two-tier storage**: in-process cache in front of Redis, with fallback
//!   reads and writes while Redis is unreachable
//! - **Health gating**: a circuit-breaker-guarded probe decides when Redis is
//!   trusted; request paths only read a cached flag
//! - **Reconciliation**: cache-only records are pushed back to Redis once it
//!   recovers
//! - **Lifecycle**: code exchange, tenant binding, proactive refresh with
//!   per-user single-flight, and revocation
//!
//! ## Architecture
//!
//! ```text
//! CredentialService ──▶ CredentialStore ◀── CredentialBackend::{Durable, Resilient}
//!        │                                         │
//!        ▼                                         ▼
//! AuthorizationServer              ResilientCredentialStore ──▶ RedisCredentialStore
//!                                          ▲
//!                                   HealthMonitor (probe + circuit breaker)
//! ```
//!
//! ## Example
//!
//! ```rust
//! use ledgerlink_auth::config::CredentialConfig;
//! use ledgerlink_auth::environment::CredentialEnvironment;
//! use ledgerlink_auth::mocks::{InMemoryCredentialStore, MockAuthorizationServer};
//! use ledgerlink_auth::utils::generate_state;
//! use ledgerlink_auth::{CredentialService, UserId};
//!
//! # async fn example() -> ledgerlink_auth::Result<()> {
//! let service = CredentialService::new(
//!     CredentialEnvironment::new(InMemoryCredentialStore::new(), MockAuthorizationServer::new()),
//!     CredentialConfig::default(),
//! );
//!
//! // 1. Redirect the user to the consent page
//! let state = generate_state();
//! let url = service.build_authorization_url(&state)?;
//!
//! // 2. Handle the callback
//! let user = UserId::from("u1");
//! service.complete_authorization("code-from-callback", &user, Some("9991")).await?;
//!
//! // 3. Use the token for API calls
//! let record = service.get_valid_token(&user).await?;
//! # let _ = (url, record);
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

// Public modules
pub mod config;
pub mod constants;
pub mod environment;
pub mod error;
pub mod health;
pub mod providers;
pub mod service;
pub mod state;
pub mod stores;
pub mod utils;

/// Mock implementations for testing.
#[cfg(any(test, feature = "test-utils"))]
pub mod mocks;

// Re-export main types for convenience
pub use error::{CredentialError, Result};
pub use health::HealthMonitor;
pub use service::CredentialService;
pub use state::{ConnectionStatus, CredentialRecord, TokenGrant, UserId};
pub use stores::{CredentialBackend, ResilientCredentialStore};

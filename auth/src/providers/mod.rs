//! Credential providers.
//!
//! This module defines traits for the external dependencies of the
//! credential system. The service and the resilient store depend only on
//! these traits, so every combination can be exercised with the mocks in
//! [`crate::mocks`].
//!
//! ```text
//! ┌────────────────────┐      ┌─────────────────────┐
//! │ CredentialService  │─────▶│ AuthorizationServer │  (HTTP, upstream)
//! └─────────┬──────────┘      └─────────────────────┘
//!           │
//!           ▼
//! ┌────────────────────┐      ┌─────────────────────┐
//! │ CredentialStore    │◀─────│ HealthSignal        │  (is the durable tier
//! │ (durable/resilient)│      │  ◀─ LivenessProbe   │   trusted right now?)
//! └────────────────────┘      └─────────────────────┘
//! ```

pub mod authorization;
pub mod credential_store;
pub mod health;
pub mod http;

pub use authorization::AuthorizationServer;
pub use credential_store::CredentialStore;
pub use health::{HealthSignal, LivenessProbe};
pub use http::HttpAuthorizationServer;

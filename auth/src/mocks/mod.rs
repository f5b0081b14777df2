//! Mock provider implementations for testing.
//!
//! In-memory, deterministic implementations of every provider trait, plus a
//! settable clock. Each mock is `Clone` and clones share state, so a test
//! can hand one clone to the code under test and keep another to script
//! failures and inspect calls.

pub mod authorization;
pub mod clock;
pub mod credential_store;
pub mod health;

pub use authorization::{MockAuthorizationServer, grant};
pub use clock::MockClock;
pub use credential_store::{InMemoryCredentialStore, StoreCall};
pub use health::{ScriptedProbe, StaticHealth};

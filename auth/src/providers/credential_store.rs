//! Credential storage trait.

use crate::error::Result;
use crate::state::{CredentialRecord, UserId};

/// Store of credential records keyed by user.
///
/// Implemented by the Redis adapter, the resilient two-tier store, the
/// configured-backend enum and the in-memory mock. There is no ordering
/// guarantee across users; operations for one user from one caller are
/// sequential.
///
/// # Errors
///
/// - [`NotFound`](crate::CredentialError::NotFound) when no record exists
/// - [`Unavailable`](crate::CredentialError::Unavailable) when the backing
///   tier cannot be reached (never returned by the resilient store)
pub trait CredentialStore: Send + Sync {
    /// Insert or replace the record for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns error if the record cannot be stored.
    fn save(
        &self,
        user_id: &UserId,
        record: &CredentialRecord,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Load the record for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if there is no record.
    fn get(
        &self,
        user_id: &UserId,
    ) -> impl std::future::Future<Output = Result<CredentialRecord>> + Send;

    /// Remove the record for `user_id`. Removing a missing record succeeds.
    ///
    /// # Errors
    ///
    /// Returns error if the backing tier cannot be reached.
    fn delete(&self, user_id: &UserId) -> impl std::future::Future<Output = Result<()>> + Send;
}

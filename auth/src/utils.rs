//! Anti-forgery state helpers for the authorization redirect.

use crate::constants::{STATE_BYTES, STATE_TTL};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use rand::RngCore;
use rand::rngs::OsRng;

/// Generate an unguessable `state` value for the authorization URL.
///
/// Returns 32 random bytes encoded as URL-safe base64 without padding, so
/// the value can be placed in a query string unescaped. The caller records
/// when it was issued, and on callback checks it with [`states_match`] and
/// [`state_is_fresh`].
///
/// # Examples
///
/// ```
/// use ledgerlink_auth::utils::generate_state;
///
/// let state = generate_state();
/// assert_eq!(state.len(), 43);
/// assert_ne!(state, generate_state());
/// ```
#[must_use]
pub fn generate_state() -> String {
    let mut bytes = [0u8; STATE_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Compare an expected and received `state` value in constant time.
///
/// # Examples
///
/// ```
/// use ledgerlink_auth::utils::states_match;
///
/// assert!(states_match("abc", "abc"));
/// assert!(!states_match("abc", "abd"));
/// assert!(!states_match("", ""));
/// ```
#[must_use]
pub fn states_match(expected: &str, received: &str) -> bool {
    !expected.is_empty() && constant_time_eq::constant_time_eq(expected.as_bytes(), received.as_bytes())
}

/// Whether a `state` issued at `issued_at` is still acceptable at `now`.
///
/// A state expires [`STATE_TTL`] after issuance. A state issued in the
/// future is rejected.
#[must_use]
pub fn state_is_fresh(issued_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    // to_std fails for negative ages
    now.signed_duration_since(issued_at)
        .to_std()
        .is_ok_and(|age| age <= STATE_TTL)
}

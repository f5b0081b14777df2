//! Settable clock.

use crate::environment::Clock;
use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};

/// Clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct MockClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl MockClock {
    /// Create a clock frozen at `now`.
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    /// Set the current time.
    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }

    /// Move the clock forward.
    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for MockClock {
    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

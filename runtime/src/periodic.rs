//! Cancellable periodic background tasks.
//!
//! A [`PeriodicTask`] owns one tokio task that runs an async job on a fixed
//! interval until it is stopped. Each task has its own loop and its own
//! [`CancellationToken`]; nothing is shared between tasks.
//!
//! ```rust
//! use ledgerlink_runtime::periodic::PeriodicTask;
//! use std::time::Duration;
//!
//! # async fn example() {
//! let task = PeriodicTask::spawn("heartbeat", Duration::from_secs(5), || async {
//!     tracing::debug!("tick");
//! });
//!
//! // ... later, on shutdown
//! task.shutdown().await;
//! # }
//! ```

use crate::metrics::PeriodicTaskMetrics;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

// tokio intervals reject a zero period
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Handle to a running periodic task.
#[derive(Debug)]
pub struct PeriodicTask {
    name: &'static str,
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    /// Spawn a task whose first run happens one `period` from now.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<F, Fut>(name: &'static str, period: Duration, job: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::spawn_with_delay(name, period, period, job)
    }

    /// Spawn a task whose first run happens after `initial_delay`.
    ///
    /// A zero delay runs the job immediately. Runs never overlap: if a job
    /// outlives its period the next run is delayed rather than doubled up.
    pub fn spawn_with_delay<F, Fut>(
        name: &'static str,
        initial_delay: Duration,
        period: Duration,
        mut job: F,
    ) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let period = period.max(MIN_PERIOD);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + initial_delay, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::debug!(task = name, ?period, "Periodic task started");

            loop {
                tokio::select! {
                    () = cancelled.cancelled() => break,
                    _ = ticker.tick() => {
                        PeriodicTaskMetrics::record_tick(name);
                        tokio::select! {
                            () = cancelled.cancelled() => break,
                            () = job() => {}
                        }
                    }
                }
            }

            tracing::debug!(task = name, "Periodic task stopped");
        });

        Self {
            name,
            token,
            handle: Some(handle),
        }
    }

    /// Task name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Signal the task to stop without waiting for it.
    ///
    /// An in-flight run is abandoned at its next await point.
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Whether the task loop has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Stop the task and wait for its loop to exit.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::error!(task = self.name, error = %e, "Periodic task panicked");
            }
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_task(
        delay: Duration,
        period: Duration,
    ) -> (PeriodicTask, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let task = PeriodicTask::spawn_with_delay("test", delay, period, move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        (task, runs)
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_run_waits_one_period() {
        let (task, runs) = counting_task(Duration::from_secs(60), Duration::from_secs(60));

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        task.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_delay_runs_immediately() {
        let (task, runs) = counting_task(Duration::ZERO, Duration::from_secs(30));

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        task.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_halts_future_runs() {
        let (task, runs) = counting_task(Duration::ZERO, Duration::from_secs(10));
        tokio::time::sleep(Duration::from_millis(1)).await;

        task.stop();
        tokio::time::sleep(Duration::from_secs(100)).await;

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(task.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_abandons_long_running_job() {
        let task = PeriodicTask::spawn_with_delay(
            "slow",
            Duration::ZERO,
            Duration::from_secs(1),
            || async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            },
        );
        tokio::time::sleep(Duration::from_millis(1)).await;

        let stopped = tokio::time::timeout(Duration::from_secs(1), task.shutdown()).await;
        assert!(stopped.is_ok());
    }
}

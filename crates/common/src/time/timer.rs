//! One-shot and recurring timers
//!
//! Timers run on the tokio runtime and are owned through a [`TimerHandle`].
//! The scheduled work itself is spawned as a detached task once the timer
//! fires, so a callback may safely cancel (or replace) the handle of the
//! timer that started it.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::AbortHandle;
use tokio::time::sleep;

/// A timer handle that can be used to cancel a timer
#[derive(Debug, Clone)]
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
    abort: Option<AbortHandle>,
}

impl TimerHandle {
    fn new() -> Self {
        Self { cancelled: Arc::new(AtomicBool::new(false)), abort: None }
    }

    /// Cancel the timer. Work that already fired keeps running.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(abort) = &self.abort {
            abort.abort();
        }
    }

    /// Check if the timer has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Run `task` once after `delay`.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
///
/// use sessiongate_common::time::timer::after;
///
/// #[tokio::main]
/// async fn main() {
///     let handle = after(Duration::from_secs(5), || async {
///         tracing::info!("timer_fired");
///     });
///     handle.cancel();
/// }
/// ```
pub fn after<F, Fut>(delay: Duration, task: F) -> TimerHandle
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mut handle = TimerHandle::new();
    let cancelled = handle.cancelled.clone();

    let join = tokio::spawn(async move {
        sleep(delay).await;
        if !cancelled.load(Ordering::SeqCst) {
            tokio::spawn(task());
        }
    });

    handle.abort = Some(join.abort_handle());
    handle
}

/// Run `task` every `period`, starting one period from now.
///
/// Each run is spawned independently; overlapping runs are the callee's
/// concern.
pub fn recurring<F, Fut>(period: Duration, mut task: F) -> TimerHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mut handle = TimerHandle::new();
    let cancelled = handle.cancelled.clone();

    let join = tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.tick().await; // Skip first immediate tick

        loop {
            interval.tick().await;
            if cancelled.load(Ordering::SeqCst) {
                break;
            }
            tokio::spawn(task());
        }
    });

    handle.abort = Some(join.abort_handle());
    handle
}

#[cfg(test)]
mod tests {
    //! Unit tests for time::timer.
    use std::sync::atomic::AtomicU32;

    use super::*;

    /// Validates `after` for the timer fires scenario.
    ///
    /// Assertions:
    /// - Confirms `counter.load(Ordering::SeqCst)` equals `1`.
    /// - Ensures the handle was not cancelled.
    #[tokio::test(start_paused = true)]
    async fn test_after_fires_once() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let handle = after(Duration::from_secs(10), move || async move {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });

        sleep(Duration::from_secs(11)).await;
        tokio::task::yield_now().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(!handle.is_cancelled());
    }

    /// Validates `after` for the timeout cancelled scenario.
    ///
    /// Assertions:
    /// - Confirms `counter.load(Ordering::SeqCst)` equals `0`.
    #[tokio::test(start_paused = true)]
    async fn test_after_cancelled() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let handle = after(Duration::from_secs(50), move || async move {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });

        handle.cancel();
        sleep(Duration::from_secs(60)).await;

        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert!(handle.is_cancelled());
    }

    /// Validates `recurring` for the periodic tick scenario.
    ///
    /// Assertions:
    /// - Confirms the task ran three times before cancellation.
    /// - Confirms no further runs happen after cancellation.
    #[tokio::test(start_paused = true)]
    async fn test_recurring_until_cancelled() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let handle = recurring(Duration::from_secs(10), move || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        sleep(Duration::from_secs(35)).await;
        tokio::task::yield_now().await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);

        handle.cancel();
        sleep(Duration::from_secs(30)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }
}

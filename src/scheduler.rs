//! Change scheduler - coalesces bursts of edits into one preview run.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Delay between the last edit of a burst and the preview run.
pub const PREVIEW_DEBOUNCE: Duration = Duration::from_millis(500);

/// Runs a callback once, `delay` after the most recent [`trigger`](Self::trigger).
///
/// Each debouncer owns its own timer, so independent debouncers never cancel
/// each other. Must be triggered from within a tokio runtime. Dropping the
/// debouncer discards a pending run.
pub struct Debouncer {
    delay: Duration,
    callback: Arc<dyn Fn() + Send + Sync>,
    pending: Option<JoinHandle<()>>,
}

impl Debouncer {
    pub fn new(delay: Duration, callback: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            delay,
            callback: Arc::new(callback),
            pending: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Restart the timer. Any run scheduled by an earlier trigger is discarded.
    pub fn trigger(&mut self) {
        self.cancel();
        let delay = self.delay;
        let callback = Arc::clone(&self.callback);
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            callback();
        }));
    }

    /// Discard the pending run, if any.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }

    /// Whether a run is scheduled and has not fired yet.
    pub fn is_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, impl Fn() + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        (count, move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
    }

    async fn advance(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_runs_once_after_last_trigger() {
        let (count, callback) = counter();
        let mut debouncer = Debouncer::new(Duration::from_millis(300), callback);

        for _ in 0..10 {
            debouncer.trigger();
            advance(100).await;
        }
        assert_eq!(count.load(Ordering::SeqCst), 0);

        // 100ms already elapsed since the last trigger
        advance(150).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        advance(100).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        advance(1000).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_discards_pending_run() {
        let (count, callback) = counter();
        let mut debouncer = Debouncer::new(Duration::from_millis(300), callback);

        debouncer.trigger();
        assert!(debouncer.is_pending());
        debouncer.cancel();
        advance(1000).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_independent_debouncers_keep_their_own_timers() {
        let (first_count, first) = counter();
        let (second_count, second) = counter();
        let mut a = Debouncer::new(Duration::from_millis(200), first);
        let mut b = Debouncer::new(Duration::from_millis(200), second);

        a.trigger();
        advance(100).await;
        b.trigger();
        advance(150).await;
        assert_eq!(first_count.load(Ordering::SeqCst), 1);
        assert_eq!(second_count.load(Ordering::SeqCst), 0);
        advance(100).await;
        assert_eq!(second_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels() {
        let (count, callback) = counter();
        let mut debouncer = Debouncer::new(Duration::from_millis(50), callback);
        debouncer.trigger();
        drop(debouncer);
        advance(500).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}

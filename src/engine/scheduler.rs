//! Flush scheduling.
//!
//! The coalescing delay is the engine's only suspension point, so it is
//! isolated behind a trait: production uses tokio timers, tests use a
//! manual scheduler that fires on demand.

use std::time::Duration;

use parking_lot::Mutex;
use std::sync::Arc;

/// A scheduled flush that can be cancelled before it fires.
///
/// Dropping the handle does NOT cancel the flush; cancellation is always
/// explicit (`close()` is the only caller).
pub struct FlushHandle {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl FlushHandle {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

/// "Run this once, after this delay" primitive.
pub trait Scheduler: Send + Sync {
    fn schedule(&self, delay: Duration, task: Box<dyn FnOnce() + Send>) -> FlushHandle;
}

// =============================================================================
// Tokio scheduler (production)
// =============================================================================

/// Timer-backed scheduler running tasks on the tokio runtime.
pub struct TokioScheduler {
    handle: tokio::runtime::Handle,
}

impl TokioScheduler {
    /// Bind to the current runtime. Must be called within one.
    pub fn current() -> Self {
        Self {
            handle: tokio::runtime::Handle::current(),
        }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: Box<dyn FnOnce() + Send>) -> FlushHandle {
        let (cancel_tx, cancel_rx) = tokio::sync::oneshot::channel::<()>();

        self.handle.spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => task(),
                _ = cancel_rx => {}
            }
        });

        FlushHandle::new(move || {
            let _ = cancel_tx.send(());
        })
    }
}

// =============================================================================
// Manual scheduler (deterministic tests)
// =============================================================================

/// Scheduler that holds tasks until told to fire.
///
/// Gives tests full control over the coalescing window: enqueue changes,
/// then `run_pending()` stands in for the debounce timer elapsing.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    inner: Arc<Mutex<ManualInner>>,
}

#[derive(Default)]
struct ManualInner {
    next_id: u64,
    tasks: Vec<(u64, Box<dyn FnOnce() + Send>)>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of scheduled, un-fired flushes.
    pub fn pending(&self) -> usize {
        self.inner.lock().tasks.len()
    }

    /// Fire every scheduled task, as if all timers elapsed.
    pub fn run_pending(&self) {
        // Drain first: a firing task may schedule the next window
        let tasks: Vec<_> = std::mem::take(&mut self.inner.lock().tasks);
        for (_, task) in tasks {
            task();
        }
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, _delay: Duration, task: Box<dyn FnOnce() + Send>) -> FlushHandle {
        let id = {
            let mut inner = self.inner.lock();
            inner.next_id += 1;
            let id = inner.next_id;
            inner.tasks.push((id, task));
            id
        };

        let inner = Arc::clone(&self.inner);
        FlushHandle::new(move || {
            inner.lock().tasks.retain(|(task_id, _)| *task_id != id);
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn manual_scheduler_fires_on_demand() {
        let scheduler = ManualScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&fired);
        let _handle = scheduler.schedule(
            Duration::from_millis(50),
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert_eq!(fired.load(Ordering::SeqCst), 0);
        scheduler.run_pending();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        // Fired tasks are not re-run
        scheduler.run_pending();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancelled_flush_never_fires() {
        let scheduler = ManualScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&fired);
        let handle = scheduler.schedule(
            Duration::from_millis(50),
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        handle.cancel();
        scheduler.run_pending();
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn tokio_scheduler_fires_after_delay() {
        let scheduler = TokioScheduler::current();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let _handle = scheduler.schedule(
            Duration::from_millis(5),
            Box::new(move || {
                let _ = tx.send(());
            }),
        );

        tokio::time::timeout(Duration::from_secs(1), rx)
            .await
            .expect("flush timer never fired")
            .unwrap();
    }
}

//! Change coalescing.
//!
//! Absorbs bursts of near-simultaneous file-change notifications (an
//! editor writing a file twice, a save touching several files) into one
//! classification + broadcast pass. Pure bookkeeping: the scheduling
//! itself lives behind [`super::scheduler::Scheduler`], and the engine
//! drives the flush.

use rustc_hash::FxHashSet;
use tokio::sync::oneshot;

use super::scheduler::FlushHandle;
use crate::graph::ModuleId;

/// Pending-set of changed ids plus the single scheduled flush.
#[derive(Default)]
pub struct Coalescer {
    pending: FxHashSet<ModuleId>,
    waiters: Vec<oneshot::Sender<()>>,
    scheduled: Option<FlushHandle>,
}

impl Coalescer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a changed id to the pending set.
    ///
    /// Returns `true` if no flush is scheduled yet; the caller must then
    /// schedule one and hand the handle to [`Coalescer::mark_scheduled`].
    pub fn enqueue(&mut self, id: ModuleId) -> bool {
        self.pending.insert(id);
        self.scheduled.is_none()
    }

    /// Register a completion waiter resolved when the current window's
    /// flush outcome has been handed to the broadcaster.
    pub fn add_waiter(&mut self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.waiters.push(tx);
        rx
    }

    pub fn mark_scheduled(&mut self, handle: FlushHandle) {
        debug_assert!(self.scheduled.is_none());
        self.scheduled = Some(handle);
    }

    pub fn is_scheduled(&self) -> bool {
        self.scheduled.is_some()
    }

    /// Drain the window: pending ids and waiters, clearing the schedule.
    ///
    /// Changes enqueued after this point belong to the next window.
    pub fn take_batch(&mut self) -> (FxHashSet<ModuleId>, Vec<oneshot::Sender<()>>) {
        self.scheduled = None;
        (
            std::mem::take(&mut self.pending),
            std::mem::take(&mut self.waiters),
        )
    }

    /// Cancel the scheduled flush and discard the pending set.
    ///
    /// Waiters are returned so the caller can resolve them: callers
    /// awaiting `handle_update` still get their completion signal on
    /// shutdown. A restart never resurrects stale pending changes.
    pub fn cancel(&mut self) -> Vec<oneshot::Sender<()>> {
        if let Some(handle) = self.scheduled.take() {
            handle.cancel();
        }
        self.pending.clear();
        std::mem::take(&mut self.waiters)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

// =============================================================================
// Tests
// =============================================================================

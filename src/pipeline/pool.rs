//! Slot accounting for the dispatcher's worker pool.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Slots in use and the high-water mark. Only the dispatcher creates one; workers see it
/// solely through the [`SlotGuard`] they are handed.
#[derive(Debug)]
pub(crate) struct PoolState {
    total: usize,
    in_use: AtomicUsize,
    peak: AtomicUsize,
    started: AtomicUsize,
}

impl PoolState {
    pub(crate) fn new(total: usize) -> Arc<Self> {
        Arc::new(Self {
            total,
            in_use: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            started: AtomicUsize::new(0),
        })
    }

    /// Grant a slot for one item. The slot returns to the pool when the guard drops.
    pub(crate) fn acquire(self: &Arc<Self>) -> SlotGuard {
        let now = self.in_use.fetch_add(1, Ordering::SeqCst) + 1;
        debug_assert!(now <= self.total, "slot overcommit: {now} > {}", self.total);
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.started.fetch_add(1, Ordering::SeqCst);
        SlotGuard {
            pool: Arc::clone(self),
        }
    }

    pub(crate) fn available(&self) -> usize {
        self.total - self.in_use.load(Ordering::SeqCst)
    }

    pub(crate) fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub(crate) fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

pub(crate) struct SlotGuard {
    pool: Arc<PoolState>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.pool.in_use.fetch_sub(1, Ordering::SeqCst);
    }
}

//! Controller counters
//!
//! The counters use Relaxed ordering: they are purely observational and do
//! not synchronize any other memory operations.

use std::sync::atomic::{AtomicU64, Ordering};

/// Running counters kept by every controller
#[derive(Debug, Default)]
pub struct ControllerStats {
    registered: AtomicU64,
    committed: AtomicU64,
    rolled_back: AtomicU64,
    aborts: AtomicU64,
    skipped_writes: AtomicU64,
    lock_waits: AtomicU64,
}

impl ControllerStats {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a registration
    pub fn record_register(&self) {
        self.registered.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a commit of a live transaction
    pub fn record_commit(&self) {
        self.committed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a rollback of a live transaction
    pub fn record_rollback(&self) {
        self.rolled_back.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a refused access
    pub fn record_abort(&self) {
        self.aborts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a write dropped by the Thomas write rule
    pub fn record_skipped_write(&self) {
        self.skipped_writes.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a lock request granted after blocking
    pub fn record_lock_wait(&self) {
        self.lock_waits.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of the counters
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            registered: self.registered.load(Ordering::Relaxed),
            committed: self.committed.load(Ordering::Relaxed),
            rolled_back: self.rolled_back.load(Ordering::Relaxed),
            aborts: self.aborts.load(Ordering::Relaxed),
            skipped_writes: self.skipped_writes.load(Ordering::Relaxed),
            lock_waits: self.lock_waits.load(Ordering::Relaxed),
        }
    }
}

/// Copy of [`ControllerStats`] at one moment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Transactions registered
    pub registered: u64,
    /// Transactions committed
    pub committed: u64,
    /// Transactions rolled back
    pub rolled_back: u64,
    /// Accesses refused with `Aborted`
    pub aborts: u64,
    /// Writes skipped under the Thomas write rule
    pub skipped_writes: u64,
    /// Lock grants that had to wait
    pub lock_waits: u64,
}

impl StatsSnapshot {
    /// Registered transactions that have not ended yet
    pub fn active(&self) -> u64 {
        self.registered
            .saturating_sub(self.committed)
            .saturating_sub(self.rolled_back)
    }
}

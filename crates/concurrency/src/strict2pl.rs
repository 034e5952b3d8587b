//! Strict two-phase locking
//!
//! Per (transaction, item) pair:
//!
//! ```text
//! NoGrant --read--> Shared --write--> Exclusive
//!    |                 |                  |
//!    +-----write-------+------------------+--> Released (commit / rollback)
//! ```
//!
//! - `read` needs a shared grant: waits while another transaction holds the
//!   item exclusively
//! - `write` needs an exclusive grant: waits while any other transaction holds
//!   the item at all; a sole reader upgrades in place
//! - grants are only released at commit/rollback, all at once
//!
//! Whether a blocked request waits forever, times out, or aborts is decided by
//! the configured [`DeadlockPolicy`].

use crate::controller::{ConcurrencyController, Protocol, WriteOutcome};
use crate::deadlock::{CycleDetection, DeadlockPolicy};
use crate::events::{Access, ControlEvent, EventSink, TracingSink};
use crate::lock::{Acquisition, LockMode, LockTable};
use crate::registry::TransactionRegistry;
use crate::stats::{ControllerStats, StatsSnapshot};
use lockstep_core::{Error, ItemKey, Result, Storage, Timestamp, TxnId};
use std::marker::PhantomData;
use std::sync::Arc;

/// Lock-based controller enforcing strict 2PL
///
/// # Example
///
/// ```
/// use lockstep_concurrency::{ConcurrencyController, Strict2PLController};
/// use lockstep_core::TxnId;
/// use lockstep_storage::MemoryStore;
///
/// let cc: Strict2PLController<&str, i64, _> = Strict2PLController::new(MemoryStore::new());
/// let t1 = TxnId::new(1);
/// cc.register(t1).unwrap();
/// cc.write(t1, "x", 5).unwrap();
/// assert_eq!(cc.read(t1, &"x").unwrap(), Some(5));
/// cc.commit(t1).unwrap();
/// ```
pub struct Strict2PLController<K, V, S>
where
    K: ItemKey,
{
    storage: S,
    registry: TransactionRegistry,
    locks: LockTable<K>,
    sink: Arc<dyn EventSink>,
    stats: ControllerStats,
    _value: PhantomData<fn() -> V>,
}

impl<K, V, S> Strict2PLController<K, V, S>
where
    K: ItemKey,
    S: Storage<K, V>,
{
    /// Controller with wait-for-graph deadlock detection and tracing events
    pub fn new(storage: S) -> Self {
        Self::with_policy(storage, Arc::new(CycleDetection), Arc::new(TracingSink))
    }

    /// Controller with an explicit deadlock policy and event sink
    pub fn with_policy(
        storage: S,
        policy: Arc<dyn DeadlockPolicy>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Strict2PLController {
            storage,
            registry: TransactionRegistry::new(),
            locks: LockTable::new(policy, Arc::clone(&sink)),
            sink,
            stats: ControllerStats::new(),
            _value: PhantomData,
        }
    }

    /// Storage collaborator
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Lock table, for inspection
    pub fn lock_table(&self) -> &LockTable<K> {
        &self.locks
    }

    /// Timestamp assigned to a live transaction
    ///
    /// # Errors
    ///
    /// `InvalidTransactionId` if `txn` is not live.
    pub fn timestamp_of(&self, txn: TxnId) -> Result<Timestamp> {
        self.registry.timestamp(txn)
    }

    fn acquire(&self, txn: TxnId, key: &K, mode: LockMode, access: Access) -> Result<()> {
        let ts = self.registry.timestamp(txn)?;

        match self.locks.acquire(txn, ts, key, mode) {
            Ok(Acquisition::AlreadyHeld) => Ok(()),
            Ok(Acquisition::Granted { waited }) => {
                if waited {
                    self.stats.record_lock_wait();
                }
                // Granted just before a concurrent termination; its release drops it
                if !self.registry.contains(txn) {
                    return Err(Error::InvalidTransactionId(txn));
                }
                if self.sink.enabled() {
                    self.sink.emit(ControlEvent::Granted {
                        txn,
                        item: format!("{:?}", key),
                        mode,
                        waited,
                    });
                }
                Ok(())
            }
            Err(err) => {
                if let Some(reason) = err.abort_reason() {
                    self.stats.record_abort();
                    if self.sink.enabled() {
                        self.sink.emit(ControlEvent::Aborted {
                            txn,
                            item: format!("{:?}", key),
                            access,
                            reason: reason.clone(),
                        });
                    }
                }
                Err(err)
            }
        }
    }

    /// Shared release step of commit and rollback; runs once per transaction
    fn release(&self, txn: TxnId) -> Option<usize> {
        self.registry.remove(txn)?;
        Some(self.locks.release_all(txn))
    }
}

impl<K, V, S> ConcurrencyController<K, V> for Strict2PLController<K, V, S>
where
    K: ItemKey,
    S: Storage<K, V>,
{
    fn protocol(&self) -> Protocol {
        Protocol::Strict2pl
    }

    fn register(&self, txn: TxnId) -> Result<Timestamp> {
        // Admitted first so no request of a live transaction is refused
        self.locks.admit(txn);
        let timestamp = self.registry.register(txn)?;
        self.stats.record_register();
        if self.sink.enabled() {
            self.sink.emit(ControlEvent::Registered { txn, timestamp });
        }
        Ok(timestamp)
    }

    fn read(&self, txn: TxnId, key: &K) -> Result<Option<V>> {
        self.acquire(txn, key, LockMode::Shared, Access::Read)?;
        Ok(self.storage.read(txn, key)?)
    }

    fn write(&self, txn: TxnId, key: K, value: V) -> Result<WriteOutcome> {
        self.acquire(txn, &key, LockMode::Exclusive, Access::Write)?;
        self.storage.write(txn, key, value)?;
        Ok(WriteOutcome::Applied)
    }

    fn commit(&self, txn: TxnId) -> Result<()> {
        // Writes become final before any grant is given up
        let stored = self.storage.commit(txn);
        if let Some(released) = self.release(txn) {
            self.stats.record_commit();
            if self.sink.enabled() {
                self.sink.emit(ControlEvent::Committed { txn, released });
            }
        }
        Ok(stored?)
    }

    fn rollback(&self, txn: TxnId) -> Result<()> {
        let stored = self.storage.rollback(txn);
        if let Some(released) = self.release(txn) {
            self.stats.record_rollback();
            if self.sink.enabled() {
                self.sink.emit(ControlEvent::RolledBack { txn, released });
            }
        }
        Ok(stored?)
    }

    fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

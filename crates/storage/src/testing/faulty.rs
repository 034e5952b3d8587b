//! Fault-injecting storage wrapper

use lockstep_core::{Storage, StorageError, StorageResult, TxnId};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Storage operation selector for fault injection and call counting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    /// `Storage::read`
    Read,
    /// `Storage::write`
    Write,
    /// `Storage::commit`
    Commit,
    /// `Storage::rollback`
    Rollback,
}

#[derive(Debug, Default)]
struct FaultState {
    pending: HashMap<StoreOp, usize>,
    calls: HashMap<StoreOp, usize>,
}

/// Store wrapper that fails selected operations on demand
///
/// Failed calls are counted but never reach the inner store.
#[derive(Debug)]
pub struct FaultyStore<S> {
    inner: S,
    state: Mutex<FaultState>,
}

impl<S> FaultyStore<S> {
    /// Wrap `inner` with no faults armed
    pub fn new(inner: S) -> Self {
        FaultyStore {
            inner,
            state: Mutex::new(FaultState::default()),
        }
    }

    /// Fail the next `count` calls of `op`
    pub fn fail_next(&self, op: StoreOp, count: usize) {
        *self.state.lock().pending.entry(op).or_default() += count;
    }

    /// Number of calls of `op` seen so far, failed or not
    pub fn calls(&self, op: StoreOp) -> usize {
        self.state.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// The wrapped store
    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn enter(&self, op: StoreOp) -> StorageResult<()> {
        let mut state = self.state.lock();
        *state.calls.entry(op).or_default() += 1;
        match state.pending.get_mut(&op) {
            Some(left) if *left > 0 => {
                *left -= 1;
                Err(StorageError::Injected(format!("{:?}", op)))
            }
            _ => Ok(()),
        }
    }
}

impl<S, K, V> Storage<K, V> for FaultyStore<S>
where
    S: Storage<K, V>,
{
    fn read(&self, txn: TxnId, key: &K) -> StorageResult<Option<V>> {
        self.enter(StoreOp::Read)?;
        self.inner.read(txn, key)
    }

    fn write(&self, txn: TxnId, key: K, value: V) -> StorageResult<()> {
        self.enter(StoreOp::Write)?;
        self.inner.write(txn, key, value)
    }

    fn commit(&self, txn: TxnId) -> StorageResult<()> {
        self.enter(StoreOp::Commit)?;
        self.inner.commit(txn)
    }

    fn rollback(&self, txn: TxnId) -> StorageResult<()> {
        self.enter(StoreOp::Rollback)?;
        self.inner.rollback(txn)
    }
}

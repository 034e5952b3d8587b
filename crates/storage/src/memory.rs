//! In-memory storage collaborator
//!
//! Writes are applied in place. Each write records the item's before-image in
//! the writing transaction's undo log:
//!
//! - `commit` drops the undo log
//! - `rollback` replays the undo log newest-first
//!
//! A before-image is restored only while the rolled-back transaction is still
//! the item's latest writer. Under timestamp ordering a younger transaction
//! may have overwritten the item in the meantime; its value must survive.
//! The younger write's own undo record captured the rolled-back value, so
//! that record inherits the rolled-back write's before-image instead.
//!
//! # Design
//!
//! - DashMap for items: sharded, per-key atomic read-modify-write via `entry`
//! - DashMap for undo logs: one entry per transaction with pending writes
//! - Write versions from an AtomicU64 identify "still the latest writer"

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use lockstep_core::{ItemKey, Storage, StorageResult, TxnId};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// A stored value together with the write that produced it
#[derive(Debug, Clone)]
struct Cell<V> {
    value: V,
    writer: TxnId,
    version: u64,
}

/// Undo information for one write
#[derive(Debug)]
struct UndoRecord<K, V> {
    key: K,
    before: Option<Cell<V>>,
    written_version: u64,
}

/// Thread-safe in-memory store with transactional undo
///
/// # Example
///
/// ```
/// use lockstep_core::{Storage, TxnId};
/// use lockstep_storage::MemoryStore;
///
/// let store: MemoryStore<&str, i64> = MemoryStore::new();
/// let txn = TxnId::new(1);
/// store.write(txn, "x", 10).unwrap();
/// store.rollback(txn).unwrap();
/// assert_eq!(store.get(&"x"), None);
/// ```
#[derive(Debug)]
pub struct MemoryStore<K, V>
where
    K: ItemKey,
{
    cells: DashMap<K, Cell<V>>,
    undo: DashMap<TxnId, Vec<UndoRecord<K, V>>>,
    next_version: AtomicU64,
}

impl<K, V> MemoryStore<K, V>
where
    K: ItemKey,
    V: Clone + Send + Sync + 'static,
{
    /// Create an empty store
    pub fn new() -> Self {
        MemoryStore {
            cells: DashMap::new(),
            undo: DashMap::new(),
            next_version: AtomicU64::new(1),
        }
    }

    /// Create a store pre-populated with committed values
    ///
    /// Seeded values have no owning transaction and are never rolled back.
    pub fn with_items(items: impl IntoIterator<Item = (K, V)>) -> Self {
        let store = Self::new();
        for (key, value) in items {
            let version = store.next_version.fetch_add(1, Ordering::Relaxed);
            store.cells.insert(
                key,
                Cell {
                    value,
                    writer: TxnId::new(0),
                    version,
                },
            );
        }
        store
    }

    /// Current value of `key`, regardless of which transaction wrote it
    pub fn get(&self, key: &K) -> Option<V> {
        self.cells.get(key).map(|cell| cell.value.clone())
    }

    /// Transaction that last wrote `key`
    pub fn last_writer(&self, key: &K) -> Option<TxnId> {
        self.cells.get(key).map(|cell| cell.writer)
    }

    /// Number of items holding a value
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// True if no item holds a value
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Number of writes `txn` would undo on rollback
    pub fn pending_undo(&self, txn: TxnId) -> usize {
        self.undo.get(&txn).map(|log| log.len()).unwrap_or(0)
    }

    fn log_undo(&self, txn: TxnId, key: K, before: Option<Cell<V>>, written_version: u64) {
        self.undo.entry(txn).or_default().push(UndoRecord {
            key,
            before,
            written_version,
        });
    }

    /// Hand a superseded write's before-image to the record that captured it
    ///
    /// Must be called with the item's shard held, so the overwriting write
    /// has already logged its record.
    fn forward_before_image(&self, version: u64, before: Option<Cell<V>>) {
        for mut log in self.undo.iter_mut() {
            let captured = log
                .value_mut()
                .iter_mut()
                .find(|record| record.before.as_ref().is_some_and(|b| b.version == version));
            if let Some(record) = captured {
                record.before = before;
                return;
            }
        }
    }
}

impl<K, V> Default for MemoryStore<K, V>
where
    K: ItemKey,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Storage<K, V> for MemoryStore<K, V>
where
    K: ItemKey,
    V: Clone + Send + Sync + 'static,
{
    fn read(&self, _txn: TxnId, key: &K) -> StorageResult<Option<V>> {
        Ok(self.get(key))
    }

    fn write(&self, txn: TxnId, key: K, value: V) -> StorageResult<()> {
        let version = self.next_version.fetch_add(1, Ordering::Relaxed);
        let cell = Cell {
            value,
            writer: txn,
            version,
        };

        // The shard stays locked until the undo record is logged, so a
        // rollback of the overwritten writer finds the record
        match self.cells.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let before = occupied.insert(cell);
                self.log_undo(txn, key, Some(before), version);
            }
            Entry::Vacant(vacant) => {
                let _slot = vacant.insert(cell);
                self.log_undo(txn, key, None, version);
            }
        }
        Ok(())
    }

    fn commit(&self, txn: TxnId) -> StorageResult<()> {
        if let Some((_, log)) = self.undo.remove(&txn) {
            debug!(target: "lockstep::storage", %txn, writes = log.len(), "commit");
        }
        Ok(())
    }

    fn rollback(&self, txn: TxnId) -> StorageResult<()> {
        let Some((_, log)) = self.undo.remove(&txn) else {
            return Ok(());
        };

        let mut restored = 0usize;
        let mut superseded = 0usize;
        for record in log.into_iter().rev() {
            let UndoRecord {
                key,
                before,
                written_version,
            } = record;

            match self.cells.entry(key) {
                Entry::Occupied(mut occupied) if occupied.get().version == written_version => {
                    match before {
                        Some(cell) => {
                            occupied.insert(cell);
                        }
                        None => {
                            occupied.remove();
                        }
                    }
                    restored += 1;
                }
                _shard => {
                    self.forward_before_image(written_version, before);
                    superseded += 1;
                }
            }
        }

        debug!(target: "lockstep::storage", %txn, restored, superseded, "rollback");
        Ok(())
    }
}

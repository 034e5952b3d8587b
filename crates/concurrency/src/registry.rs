//! Transaction and data-item registries
//!
//! - [`TransactionRegistry`]: live transactions and their timestamps
//! - [`ItemTable`]: per-item metadata, created on first touch
//!
//! Both are DashMap-backed, so lookups for unrelated transactions or items do
//! not contend.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use lockstep_core::{Error, ItemKey, Result, Timestamp, TxnId};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Live transactions and the timestamps assigned to them
///
/// Timestamps come from a single monotonic allocator and are handed out in
/// registration order, starting at `Timestamp::ZERO`. Once assigned, a
/// transaction's timestamp never changes.
#[derive(Debug, Default)]
pub struct TransactionRegistry {
    live: DashMap<TxnId, Timestamp>,
    next_ts: AtomicU64,
}

impl TransactionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit `txn` and assign its timestamp
    ///
    /// The timestamp is allocated while the vacant entry is held, so a
    /// rejected duplicate does not consume one.
    ///
    /// # Errors
    ///
    /// `InvalidTransactionId` if `txn` is already live.
    pub fn register(&self, txn: TxnId) -> Result<Timestamp> {
        match self.live.entry(txn) {
            Entry::Occupied(_) => Err(Error::InvalidTransactionId(txn)),
            Entry::Vacant(vacant) => {
                let ts = Timestamp::new(self.next_ts.fetch_add(1, Ordering::SeqCst));
                vacant.insert(ts);
                Ok(ts)
            }
        }
    }

    /// Timestamp of a live transaction
    ///
    /// # Errors
    ///
    /// `InvalidTransactionId` if `txn` is not registered or already ended.
    pub fn timestamp(&self, txn: TxnId) -> Result<Timestamp> {
        self.live
            .get(&txn)
            .map(|entry| *entry.value())
            .ok_or(Error::InvalidTransactionId(txn))
    }

    /// End `txn`; returns its timestamp the first time only
    pub fn remove(&self, txn: TxnId) -> Option<Timestamp> {
        self.live.remove(&txn).map(|(_, ts)| ts)
    }

    /// True if `txn` is live
    pub fn contains(&self, txn: TxnId) -> bool {
        self.live.contains_key(&txn)
    }

    /// Number of live transactions
    pub fn live_count(&self) -> usize {
        self.live.len()
    }
}

/// Lazily-populated per-item metadata
///
/// Each item's metadata sits behind its own mutex. Callers clone the `Arc`
/// out of the map and lock it after the map shard is released, so holding one
/// item never blocks access to another.
pub struct ItemTable<K, M> {
    items: DashMap<K, Arc<Mutex<M>>>,
}

impl<K, M> ItemTable<K, M>
where
    K: ItemKey,
    M: Default,
{
    /// Create an empty table
    pub fn new() -> Self {
        ItemTable {
            items: DashMap::new(),
        }
    }

    /// Metadata for `key`, created with `M::default()` on first touch
    pub fn entry(&self, key: &K) -> Arc<Mutex<M>> {
        if let Some(existing) = self.items.get(key) {
            return Arc::clone(existing.value());
        }
        Arc::clone(self.items.entry(key.clone()).or_default().value())
    }

    /// Number of items touched so far
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True if no item has been touched
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<K, M> ItemTable<K, M>
where
    K: ItemKey,
    M: Default + Clone,
{
    /// Copy of the metadata for `key` without creating it
    pub fn peek(&self, key: &K) -> Option<M> {
        let item = self.items.get(key).map(|entry| Arc::clone(entry.value()))?;
        let snapshot = item.lock().clone();
        Some(snapshot)
    }
}

impl<K, M> Default for ItemTable<K, M>
where
    K: ItemKey,
    M: Default,
{
    fn default() -> Self {
        Self::new()
    }
}

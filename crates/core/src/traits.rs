//! Storage collaborator abstraction
//!
//! Controllers decide *whether* an access may proceed; the value itself lives
//! behind this trait. Durability, buffering and persistence are the store's
//! business.

use std::sync::Arc;

use crate::error::StorageResult;
use crate::types::TxnId;

/// Storage collaborator consulted after an access is granted
///
/// Thread safety: controllers call into the store from many threads at once,
/// so every method must be safe to call concurrently (requires Send + Sync).
///
/// The transaction ID is passed on reads and writes so an implementation can
/// keep per-transaction undo information.
pub trait Storage<K, V>: Send + Sync {
    /// Current value of `key`, or `None` if it was never written
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn read(&self, txn: TxnId, key: &K) -> StorageResult<Option<V>>;

    /// Install `value` for `key` on behalf of `txn`
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn write(&self, txn: TxnId, key: K, value: V) -> StorageResult<()>;

    /// Make the writes of `txn` final
    ///
    /// Must tolerate transactions it has never seen.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn commit(&self, txn: TxnId) -> StorageResult<()>;

    /// Discard the writes of `txn`
    ///
    /// Must tolerate transactions it has never seen.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn rollback(&self, txn: TxnId) -> StorageResult<()>;
}

impl<K, V, S> Storage<K, V> for Arc<S>
where
    S: Storage<K, V> + ?Sized,
{
    fn read(&self, txn: TxnId, key: &K) -> StorageResult<Option<V>> {
        (**self).read(txn, key)
    }

    fn write(&self, txn: TxnId, key: K, value: V) -> StorageResult<()> {
        (**self).write(txn, key, value)
    }

    fn commit(&self, txn: TxnId) -> StorageResult<()> {
        (**self).commit(txn)
    }

    fn rollback(&self, txn: TxnId) -> StorageResult<()> {
        (**self).rollback(txn)
    }
}

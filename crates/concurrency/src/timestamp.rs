//! Timestamp-ordering controllers
//!
//! Every transaction carries the timestamp it received at registration. Each
//! item carries two watermarks:
//!
//! - `read`: youngest timestamp that successfully read the item
//! - `write`: timestamp of the last applied write
//!
//! Rules (ts = requesting transaction's timestamp):
//!
//! ```text
//! read : ts < write                 -> abort
//!        otherwise                  -> read = max(read, ts), return value
//! write: decided by the WriteRule
//!        basic  : ts < read or ts < write  -> abort
//!        thomas : ts < read                -> abort
//!                 ts < write               -> skip silently
//!        applied writes set write = ts
//! ```
//!
//! Nothing blocks. The watermark check, the storage call and the watermark
//! update happen under the item's mutex, so concurrent accesses to the same
//! item are serialized and a refused or failed access updates nothing.
//!
//! Rollback does not revoke watermarks already recorded on items.

use crate::controller::{ConcurrencyController, Protocol, WriteOutcome};
use crate::events::{Access, ControlEvent, EventSink, TracingSink};
use crate::registry::{ItemTable, TransactionRegistry};
use crate::stats::{ControllerStats, StatsSnapshot};
use lockstep_core::{AbortReason, Error, ItemKey, Result, Storage, Timestamp, TxnId};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Read and write watermarks of one item
///
/// `None` is negative infinity: the item was never read (or written).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ItemTimestamps {
    /// Youngest successful reader
    pub read: Option<Timestamp>,
    /// Last applied writer
    pub write: Option<Timestamp>,
}

impl ItemTimestamps {
    fn observe_read(&mut self, ts: Timestamp) {
        self.read = Some(self.read.map_or(ts, |current| current.max(ts)));
    }
}

/// Verdict of a write rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteVerdict {
    /// Apply the write and advance the write watermark
    Apply,
    /// Drop the write without error
    Skip {
        /// Write watermark that makes it obsolete
        superseded_by: Timestamp,
    },
    /// Refuse the write
    Reject(AbortReason),
}

/// Write admission rule of a timestamp controller
pub trait WriteRule: Send + Sync + fmt::Debug {
    /// Protocol the rule implements
    fn protocol(&self) -> Protocol;

    /// Judge a write at `ts` against the item's current watermarks
    fn check(&self, ts: Timestamp, marks: &ItemTimestamps) -> WriteVerdict;
}

/// Basic timestamp ordering: any younger access to the item aborts the writer
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicWriteRule;

impl WriteRule for BasicWriteRule {
    fn protocol(&self) -> Protocol {
        Protocol::Timestamp
    }

    fn check(&self, ts: Timestamp, marks: &ItemTimestamps) -> WriteVerdict {
        if ts.is_older_than(marks.read) || ts.is_older_than(marks.write) {
            WriteVerdict::Reject(AbortReason::WriteTooLate {
                ts,
                read_ts: marks.read,
                write_ts: marks.write,
            })
        } else {
            WriteVerdict::Apply
        }
    }
}

/// Thomas write rule: writes superseded by a younger write are dropped
///
/// A younger *read* still aborts the writer, exactly as in basic ordering.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThomasWriteRule;

impl WriteRule for ThomasWriteRule {
    fn protocol(&self) -> Protocol {
        Protocol::TimestampTwr
    }

    fn check(&self, ts: Timestamp, marks: &ItemTimestamps) -> WriteVerdict {
        if ts.is_older_than(marks.read) {
            return WriteVerdict::Reject(AbortReason::WriteTooLate {
                ts,
                read_ts: marks.read,
                write_ts: marks.write,
            });
        }
        match marks.write {
            Some(write_ts) if ts < write_ts => WriteVerdict::Skip {
                superseded_by: write_ts,
            },
            _ => WriteVerdict::Apply,
        }
    }
}

/// Validation-based controller using timestamp ordering
///
/// The write rule is a type parameter; [`ThomasTimestampController`] is the
/// same controller with [`ThomasWriteRule`].
///
/// # Example
///
/// ```
/// use lockstep_concurrency::{ConcurrencyController, TimestampController};
/// use lockstep_core::TxnId;
/// use lockstep_storage::MemoryStore;
///
/// let cc: TimestampController<&str, &str, _> = TimestampController::new(MemoryStore::new());
/// let (t1, t2) = (TxnId::new(1), TxnId::new(2));
/// cc.register(t1).unwrap();
/// cc.register(t2).unwrap();
/// cc.read(t2, &"x").unwrap();
/// assert!(cc.write(t1, "x", "z").unwrap_err().is_abort());
/// ```
pub struct TimestampController<K, V, S, R = BasicWriteRule>
where
    K: ItemKey,
{
    storage: S,
    registry: TransactionRegistry,
    items: ItemTable<K, ItemTimestamps>,
    rule: R,
    sink: Arc<dyn EventSink>,
    stats: ControllerStats,
    _value: PhantomData<fn() -> V>,
}

/// Timestamp ordering with the Thomas write rule
pub type ThomasTimestampController<K, V, S> = TimestampController<K, V, S, ThomasWriteRule>;

impl<K, V, S, R> TimestampController<K, V, S, R>
where
    K: ItemKey,
    S: Storage<K, V>,
    R: WriteRule + Default,
{
    /// Controller emitting tracing events
    pub fn new(storage: S) -> Self {
        Self::with_sink(storage, Arc::new(TracingSink))
    }

    /// Controller with an explicit event sink
    pub fn with_sink(storage: S, sink: Arc<dyn EventSink>) -> Self {
        TimestampController {
            storage,
            registry: TransactionRegistry::new(),
            items: ItemTable::new(),
            rule: R::default(),
            sink,
            stats: ControllerStats::new(),
            _value: PhantomData,
        }
    }
}

impl<K, V, S, R> TimestampController<K, V, S, R>
where
    K: ItemKey,
    S: Storage<K, V>,
    R: WriteRule,
{
    /// Storage collaborator
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Timestamp assigned to a live transaction
    ///
    /// # Errors
    ///
    /// `InvalidTransactionId` if `txn` is not live.
    pub fn timestamp_of(&self, txn: TxnId) -> Result<Timestamp> {
        self.registry.timestamp(txn)
    }

    /// Current watermarks of `key`; untouched items report `(None, None)`
    pub fn item_timestamps(&self, key: &K) -> ItemTimestamps {
        self.items.peek(key).unwrap_or_default()
    }

    /// Number of items with recorded watermarks
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    fn refuse(&self, txn: TxnId, key: &K, access: Access, reason: AbortReason) -> Error {
        self.stats.record_abort();
        if self.sink.enabled() {
            self.sink.emit(ControlEvent::Aborted {
                txn,
                item: format!("{:?}", key),
                access,
                reason: reason.clone(),
            });
        }
        Error::aborted(txn, reason)
    }

    fn validated(&self, txn: TxnId, key: &K, access: Access, timestamp: Timestamp) {
        if self.sink.enabled() {
            self.sink.emit(ControlEvent::Validated {
                txn,
                item: format!("{:?}", key),
                access,
                timestamp,
            });
        }
    }

    fn finish(&self, txn: TxnId) -> bool {
        self.registry.remove(txn).is_some()
    }
}

impl<K, V, S, R> ConcurrencyController<K, V> for TimestampController<K, V, S, R>
where
    K: ItemKey,
    S: Storage<K, V>,
    R: WriteRule,
{
    fn protocol(&self) -> Protocol {
        self.rule.protocol()
    }

    fn register(&self, txn: TxnId) -> Result<Timestamp> {
        let timestamp = self.registry.register(txn)?;
        self.stats.record_register();
        if self.sink.enabled() {
            self.sink.emit(ControlEvent::Registered { txn, timestamp });
        }
        Ok(timestamp)
    }

    fn read(&self, txn: TxnId, key: &K) -> Result<Option<V>> {
        let ts = self.registry.timestamp(txn)?;
        let item = self.items.entry(key);
        let mut marks = item.lock();

        if let Some(write_ts) = marks.write.filter(|w| ts < *w) {
            let reason = AbortReason::ReadTooLate { ts, write_ts };
            return Err(self.refuse(txn, key, Access::Read, reason));
        }

        let value = self.storage.read(txn, key)?;
        marks.observe_read(ts);
        drop(marks);

        self.validated(txn, key, Access::Read, ts);
        Ok(value)
    }

    fn write(&self, txn: TxnId, key: K, value: V) -> Result<WriteOutcome> {
        let ts = self.registry.timestamp(txn)?;
        let item = self.items.entry(&key);
        let mut marks = item.lock();

        match self.rule.check(ts, &marks) {
            WriteVerdict::Reject(reason) => Err(self.refuse(txn, &key, Access::Write, reason)),
            WriteVerdict::Skip { superseded_by } => {
                drop(marks);
                self.stats.record_skipped_write();
                if self.sink.enabled() {
                    self.sink.emit(ControlEvent::WriteSkipped {
                        txn,
                        item: format!("{:?}", key),
                        timestamp: ts,
                        write_ts: superseded_by,
                    });
                }
                Ok(WriteOutcome::Skipped)
            }
            WriteVerdict::Apply => {
                let label = self.sink.enabled().then(|| format!("{:?}", key));
                self.storage.write(txn, key, value)?;
                marks.write = Some(ts);
                drop(marks);

                if let Some(item) = label {
                    self.sink.emit(ControlEvent::Validated {
                        txn,
                        item,
                        access: Access::Write,
                        timestamp: ts,
                    });
                }
                Ok(WriteOutcome::Applied)
            }
        }
    }

    fn commit(&self, txn: TxnId) -> Result<()> {
        let stored = self.storage.commit(txn);
        if self.finish(txn) {
            self.stats.record_commit();
            if self.sink.enabled() {
                let event = ControlEvent::Committed { txn, released: 0 };
                self.sink.emit(event);
            }
        }
        Ok(stored?)
    }

    fn rollback(&self, txn: TxnId) -> Result<()> {
        let stored = self.storage.rollback(txn);
        if self.finish(txn) {
            self.stats.record_rollback();
            if self.sink.enabled() {
                let event = ControlEvent::RolledBack { txn, released: 0 };
                self.sink.emit(event);
            }
        }
        Ok(stored?)
    }

    fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

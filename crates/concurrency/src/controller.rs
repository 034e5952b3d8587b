//! The concurrency controller contract
//!
//! Every strategy answers the same five calls from the transaction driver:
//!
//! ```text
//! register(txn)                  -> timestamp
//! read(txn, key)                 -> value         | Aborted | InvalidTransactionId
//! write(txn, key, value)         -> WriteOutcome  | Aborted | InvalidTransactionId
//! commit(txn) / rollback(txn)    -> ()
//! ```
//!
//! An `Aborted` error never rolls the transaction back by itself: the driver
//! decides, and must call `rollback` before reusing anything the transaction
//! touched. A refused access leaves no grant and no timestamp update behind.
//!
//! Termination policy: `commit` and `rollback` always reach the storage
//! collaborator, but release per-transaction state only the first time. A
//! second call for the same ID returns `Ok(())` and changes nothing in the
//! controller.

use crate::stats::StatsSnapshot;
use lockstep_core::{Result, Timestamp, TxnId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Concurrency-control protocol implemented by a controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Protocol {
    /// Strict two-phase locking
    #[default]
    #[serde(rename = "strict-2pl")]
    Strict2pl,
    /// Basic timestamp ordering
    #[serde(rename = "timestamp")]
    Timestamp,
    /// Timestamp ordering with the Thomas write rule
    #[serde(rename = "timestamp-twr")]
    TimestampTwr,
}

impl Protocol {
    /// Every protocol, in configuration order
    pub const ALL: [Protocol; 3] = [
        Protocol::Strict2pl,
        Protocol::Timestamp,
        Protocol::TimestampTwr,
    ];
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Strict2pl => f.write_str("strict-2pl"),
            Protocol::Timestamp => f.write_str("timestamp"),
            Protocol::TimestampTwr => f.write_str("timestamp-twr"),
        }
    }
}

/// Acknowledgement of an accepted write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The value was handed to storage
    Applied,
    /// Obsolete write dropped under the Thomas write rule; not a failure
    Skipped,
}

impl WriteOutcome {
    /// True if storage received the value
    pub fn is_applied(self) -> bool {
        self == WriteOutcome::Applied
    }
}

/// Single entry point the transaction driver talks to
///
/// Implementations are shared across threads; each call is synchronous and
/// may block only under lock-based protocols.
pub trait ConcurrencyController<K, V>: Send + Sync {
    /// Protocol this controller enforces
    fn protocol(&self) -> Protocol;

    /// Admit a new transaction and return its timestamp
    ///
    /// # Errors
    ///
    /// `InvalidTransactionId` if `txn` is already live.
    fn register(&self, txn: TxnId) -> Result<Timestamp>;

    /// Read `key` on behalf of `txn`
    ///
    /// # Errors
    ///
    /// `InvalidTransactionId`, `Aborted`, or a storage failure.
    fn read(&self, txn: TxnId, key: &K) -> Result<Option<V>>;

    /// Write `value` to `key` on behalf of `txn`
    ///
    /// # Errors
    ///
    /// `InvalidTransactionId`, `Aborted`, or a storage failure.
    fn write(&self, txn: TxnId, key: K, value: V) -> Result<WriteOutcome>;

    /// Commit `txn` and release its resources
    ///
    /// # Errors
    ///
    /// Storage failures only; resources are released regardless.
    fn commit(&self, txn: TxnId) -> Result<()>;

    /// Roll back `txn` and release its resources
    ///
    /// # Errors
    ///
    /// Storage failures only; resources are released regardless.
    fn rollback(&self, txn: TxnId) -> Result<()>;

    /// Counters since construction
    fn stats(&self) -> StatsSnapshot;
}

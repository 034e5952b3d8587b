//! Error types for lockstep
//!
//! Every controller call fails in one of three ways:
//! - `InvalidTransactionId`: the ID is not registered or already terminated
//! - `Aborted`: the protocol rejected the access; the driver must roll back
//! - `Storage`: the storage collaborator failed; propagated unchanged
//!
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use crate::types::{Timestamp, TxnId};
use thiserror::Error;

/// Result type alias for controller operations
pub type Result<T> = std::result::Result<T, Error>;

/// Result type alias for storage collaborator operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Why the protocol refused an access
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbortReason {
    /// Timestamp ordering: the item was already written by a younger transaction
    #[error("read at {ts} is older than write timestamp {write_ts}")]
    ReadTooLate {
        /// Timestamp of the reading transaction
        ts: Timestamp,
        /// Write watermark of the item at validation time
        write_ts: Timestamp,
    },

    /// Timestamp ordering: the item was read or written by a younger transaction
    #[error("write at {ts} is older than read timestamp {read_ts:?} / write timestamp {write_ts:?}")]
    WriteTooLate {
        /// Timestamp of the writing transaction
        ts: Timestamp,
        /// Read watermark of the item (`None` = never read)
        read_ts: Option<Timestamp>,
        /// Write watermark of the item (`None` = never written)
        write_ts: Option<Timestamp>,
    },

    /// Waiting for the lock would close a cycle in the wait-for graph
    #[error("deadlock detected")]
    Deadlock,

    /// The lock could not be granted before the configured deadline
    #[error("lock wait timed out")]
    LockTimeout,

    /// Wait-die: a younger transaction requested a lock held by an older one
    #[error("wait-die: younger than holder {blocker}")]
    WaitDie {
        /// Older transaction holding the conflicting grant
        blocker: TxnId,
    },

    /// The transaction was terminated while it was blocked on a lock
    #[error("cancelled while waiting for a lock")]
    Cancelled,
}

/// Failure reported by the storage collaborator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// The backing store cannot serve requests
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// Failure injected by a test harness
    #[error("injected fault: {0}")]
    Injected(String),

    /// Any other backend failure
    #[error("storage error: {0}")]
    Other(String),
}

/// Error types for the concurrency controllers
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The transaction is not registered, or has already committed/rolled back
    #[error("invalid transaction id: {0}")]
    InvalidTransactionId(TxnId),

    /// The protocol rejected the access; the caller must roll the transaction back
    #[error("transaction {txn} aborted: {reason}")]
    Aborted {
        /// Transaction whose access was rejected
        txn: TxnId,
        /// Protocol rule that fired
        reason: AbortReason,
    },

    /// Storage collaborator failure, passed through untouched
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Controller configuration is malformed
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Build an abort error
    pub fn aborted(txn: TxnId, reason: AbortReason) -> Self {
        Error::Aborted { txn, reason }
    }

    /// True for protocol aborts
    pub fn is_abort(&self) -> bool {
        matches!(self, Error::Aborted { .. })
    }

    /// True when the transaction ID was not live
    pub fn is_invalid_txn(&self) -> bool {
        matches!(self, Error::InvalidTransactionId(_))
    }

    /// Abort reason, if this is an abort
    pub fn abort_reason(&self) -> Option<&AbortReason> {
        match self {
            Error::Aborted { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

//! Identifier and ordering types
//!
//! - `TxnId`: chosen by the transaction driver, opaque to the controller
//! - `Timestamp`: logical time handed out by the controller at registration
//! - `ItemKey`: bound for the open key space of data items

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;

/// Transaction identifier assigned by the external driver
///
/// The controller never invents transaction IDs; it only validates that the
/// ID it receives is registered and still live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxnId(u64);

impl TxnId {
    /// Wrap a raw identifier
    #[inline]
    pub const fn new(raw: u64) -> Self {
        TxnId(raw)
    }

    /// Raw identifier value
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for TxnId {
    fn from(raw: u64) -> Self {
        TxnId(raw)
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn#{}", self.0)
    }
}

/// Logical timestamp of a transaction
///
/// Assigned exactly once when the transaction registers, in registration
/// order: the first registered transaction gets `Timestamp::ZERO`. A smaller
/// timestamp means an older transaction.
///
/// Per-item watermarks are expressed as `Option<Timestamp>`, where `None`
/// stands for negative infinity (no access recorded yet).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// First timestamp ever assigned
    pub const ZERO: Timestamp = Timestamp(0);

    /// Create a timestamp from its raw logical value
    #[inline]
    pub const fn new(raw: u64) -> Self {
        Timestamp(raw)
    }

    /// Raw logical value
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// True if `self` is strictly older than the watermark
    ///
    /// A `None` watermark is negative infinity, so nothing is older than it.
    #[inline]
    pub fn is_older_than(self, watermark: Option<Timestamp>) -> bool {
        matches!(watermark, Some(w) if self < w)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ts{}", self.0)
    }
}

/// Key of a data item
///
/// The key space is open: any hashable, cloneable, thread-safe type works.
/// Implemented automatically for every type meeting the bounds.
pub trait ItemKey: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static {}

impl<T> ItemKey for T where T: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static {}

//! Structured controller events
//!
//! Controllers report what they decide through an injected [`EventSink`]
//! instead of logging inline. The default [`TracingSink`] forwards events to
//! `tracing` under the `lockstep::cc` target; [`RecordingSink`] keeps them in
//! memory for assertions.

use crate::lock::LockMode;
use lockstep_core::{AbortReason, Timestamp, TxnId};
use parking_lot::Mutex;
use std::fmt;
use tracing::{debug, info, warn};

/// Kind of data access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Read request
    Read,
    /// Write request
    Write,
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Access::Read => f.write_str("read"),
            Access::Write => f.write_str("write"),
        }
    }
}

/// One observable controller decision
///
/// Item keys are carried in their `Debug` rendering so events stay
/// independent of the key type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlEvent {
    /// A transaction was admitted
    Registered {
        /// Transaction
        txn: TxnId,
        /// Assigned timestamp
        timestamp: Timestamp,
    },
    /// A lock request had to wait
    Blocked {
        /// Waiting transaction
        txn: TxnId,
        /// Item being waited on
        item: String,
        /// Requested mode
        mode: LockMode,
        /// Conflicting holders at the time of blocking
        blockers: Vec<TxnId>,
    },
    /// A lock was granted
    Granted {
        /// Transaction
        txn: TxnId,
        /// Item
        item: String,
        /// Granted mode
        mode: LockMode,
        /// True if the request blocked first
        waited: bool,
    },
    /// A timestamp check passed and the access was applied
    Validated {
        /// Transaction
        txn: TxnId,
        /// Item
        item: String,
        /// Kind of access
        access: Access,
        /// Transaction timestamp
        timestamp: Timestamp,
    },
    /// An access was refused
    Aborted {
        /// Transaction
        txn: TxnId,
        /// Item
        item: String,
        /// Kind of access
        access: Access,
        /// Rule that fired
        reason: AbortReason,
    },
    /// An obsolete write was dropped under the Thomas write rule
    WriteSkipped {
        /// Transaction
        txn: TxnId,
        /// Item
        item: String,
        /// Transaction timestamp
        timestamp: Timestamp,
        /// Newer write timestamp that superseded it
        write_ts: Timestamp,
    },
    /// A transaction committed
    Committed {
        /// Transaction
        txn: TxnId,
        /// Number of lock grants released
        released: usize,
    },
    /// A transaction rolled back
    RolledBack {
        /// Transaction
        txn: TxnId,
        /// Number of lock grants released
        released: usize,
    },
}

impl ControlEvent {
    /// Transaction the event is about
    pub fn txn(&self) -> TxnId {
        match self {
            ControlEvent::Registered { txn, .. }
            | ControlEvent::Blocked { txn, .. }
            | ControlEvent::Granted { txn, .. }
            | ControlEvent::Validated { txn, .. }
            | ControlEvent::Aborted { txn, .. }
            | ControlEvent::WriteSkipped { txn, .. }
            | ControlEvent::Committed { txn, .. }
            | ControlEvent::RolledBack { txn, .. } => *txn,
        }
    }
}

/// Observability collaborator injected into every controller
pub trait EventSink: Send + Sync + fmt::Debug {
    /// False lets controllers skip building events nobody will read
    fn enabled(&self) -> bool {
        true
    }

    /// Receive one event
    fn emit(&self, event: ControlEvent);
}

/// Forwards events to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn enabled(&self) -> bool {
        // WARN is the least verbose level any event uses
        tracing::enabled!(target: "lockstep::cc", tracing::Level::WARN)
    }

    fn emit(&self, event: ControlEvent) {
        match event {
            ControlEvent::Registered { txn, timestamp } => {
                debug!(target: "lockstep::cc", %txn, %timestamp, "registered");
            }
            ControlEvent::Blocked {
                txn,
                item,
                mode,
                blockers,
            } => {
                debug!(target: "lockstep::cc", %txn, %item, ?mode, ?blockers, "blocked");
            }
            ControlEvent::Granted {
                txn,
                item,
                mode,
                waited,
            } => {
                debug!(target: "lockstep::cc", %txn, %item, ?mode, waited, "granted");
            }
            ControlEvent::Validated {
                txn,
                item,
                access,
                timestamp,
            } => {
                debug!(target: "lockstep::cc", %txn, %item, %access, %timestamp, "validated");
            }
            ControlEvent::Aborted {
                txn,
                item,
                access,
                reason,
            } => {
                warn!(target: "lockstep::cc", %txn, %item, %access, %reason, "aborted");
            }
            ControlEvent::WriteSkipped {
                txn,
                item,
                timestamp,
                write_ts,
            } => {
                debug!(
                    target: "lockstep::cc",
                    %txn, %item, %timestamp, %write_ts,
                    "obsolete write skipped"
                );
            }
            ControlEvent::Committed { txn, released } => {
                info!(target: "lockstep::cc", %txn, released, "committed");
            }
            ControlEvent::RolledBack { txn, released } => {
                info!(target: "lockstep::cc", %txn, released, "rolled back");
            }
        }
    }
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn enabled(&self) -> bool {
        false
    }

    fn emit(&self, _event: ControlEvent) {}
}

/// Keeps every event in memory, in emission order
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ControlEvent>>,
}

impl RecordingSink {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far
    pub fn events(&self) -> Vec<ControlEvent> {
        self.events.lock().clone()
    }

    /// Events about one transaction
    pub fn events_for(&self, txn: TxnId) -> Vec<ControlEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.txn() == txn)
            .cloned()
            .collect()
    }

    /// Number of recorded events matching `pred`
    pub fn count(&self, pred: impl Fn(&ControlEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| pred(e)).count()
    }

    /// Forget everything recorded so far
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: ControlEvent) {
        self.events.lock().push(event);
    }
}

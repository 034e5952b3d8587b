//! Deadlock handling policies for the lock table
//!
//! The lock table only guarantees blocking and exclusivity. What happens when
//! a request has to wait is decided by a pluggable [`DeadlockPolicy`]:
//!
//! - [`WaitIndefinitely`]: block until granted (deadlocks hang)
//! - [`TimeoutPolicy`]: give up after a fixed wait
//! - [`WaitDie`]: older requesters wait, younger requesters abort
//! - [`CycleDetection`]: abort the requester whose wait would close a cycle
//!
//! The policy is consulted every time a waiter finds itself blocked, with the
//! lock table mutex held, so it sees a consistent wait-for graph.

use crate::lock::LockMode;
use lockstep_core::{AbortReason, Timestamp, TxnId};
use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt;
use std::time::{Duration, Instant};

/// A transaction holding a grant that conflicts with a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Blocker {
    /// Holding transaction
    pub txn: TxnId,
    /// Registration timestamp of the holder
    pub timestamp: Timestamp,
    /// Mode the holder was granted
    pub mode: LockMode,
}

/// Everything a policy may inspect about a blocked request
#[derive(Debug)]
pub struct LockConflict<'a> {
    /// Transaction that has to wait
    pub requester: TxnId,
    /// Registration timestamp of the requester
    pub requester_ts: Timestamp,
    /// Requested mode
    pub mode: LockMode,
    /// Holders whose grants conflict with the request (never empty)
    pub blockers: &'a [Blocker],
    /// When this request first had to wait
    pub waiting_since: Instant,
    /// Wait-for graph, already containing `requester -> blockers`
    pub wait_for: &'a WaitForGraph,
}

/// Outcome of consulting a policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitDecision {
    /// Block; `deadline` of `None` waits until woken
    Wait {
        /// Give up with `LockTimeout` once this instant passes
        deadline: Option<Instant>,
    },
    /// Refuse the request and abort the requester
    Abort(AbortReason),
}

impl WaitDecision {
    /// Wait without a deadline
    pub const fn wait() -> Self {
        WaitDecision::Wait { deadline: None }
    }
}

/// Strategy applied when a lock request cannot be granted immediately
pub trait DeadlockPolicy: Send + Sync + fmt::Debug {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Decide whether the requester waits or aborts
    fn on_conflict(&self, conflict: &LockConflict<'_>) -> WaitDecision;
}

/// Block until the grant becomes available, however long that takes
#[derive(Debug, Clone, Copy, Default)]
pub struct WaitIndefinitely;

impl DeadlockPolicy for WaitIndefinitely {
    fn name(&self) -> &'static str {
        "none"
    }

    fn on_conflict(&self, _conflict: &LockConflict<'_>) -> WaitDecision {
        WaitDecision::wait()
    }
}

/// Abort with `LockTimeout` after waiting longer than `after`
#[derive(Debug, Clone, Copy)]
pub struct TimeoutPolicy {
    after: Duration,
}

impl TimeoutPolicy {
    /// Wait at most `after` for any single grant
    pub fn new(after: Duration) -> Self {
        TimeoutPolicy { after }
    }

    /// Configured maximum wait
    pub fn after(&self) -> Duration {
        self.after
    }
}

impl DeadlockPolicy for TimeoutPolicy {
    fn name(&self) -> &'static str {
        "timeout"
    }

    fn on_conflict(&self, conflict: &LockConflict<'_>) -> WaitDecision {
        WaitDecision::Wait {
            deadline: Some(conflict.waiting_since + self.after),
        }
    }
}

/// Wait-die prevention ordered by registration timestamp
///
/// A requester may only wait for younger holders. If any blocker is older,
/// the requester dies. Waits therefore always point from older to younger
/// transactions and no cycle can form.
#[derive(Debug, Clone, Copy, Default)]
pub struct WaitDie;

impl DeadlockPolicy for WaitDie {
    fn name(&self) -> &'static str {
        "wait-die"
    }

    fn on_conflict(&self, conflict: &LockConflict<'_>) -> WaitDecision {
        let oldest_older = conflict
            .blockers
            .iter()
            .filter(|b| b.timestamp < conflict.requester_ts)
            .min_by_key(|b| b.timestamp);

        match oldest_older {
            Some(blocker) => WaitDecision::Abort(AbortReason::WaitDie {
                blocker: blocker.txn,
            }),
            None => WaitDecision::wait(),
        }
    }
}

/// Wait-for graph cycle detection
///
/// The requester whose wait closes a cycle is the victim. Everyone else keeps
/// waiting and is released once the victim's driver rolls it back.
#[derive(Debug, Clone, Copy, Default)]
pub struct CycleDetection;

impl DeadlockPolicy for CycleDetection {
    fn name(&self) -> &'static str {
        "detect"
    }

    fn on_conflict(&self, conflict: &LockConflict<'_>) -> WaitDecision {
        if conflict.wait_for.in_cycle(conflict.requester) {
            WaitDecision::Abort(AbortReason::Deadlock)
        } else {
            WaitDecision::wait()
        }
    }
}

/// Directed graph of "waiter waits for holder" edges
#[derive(Debug, Default, Clone)]
pub struct WaitForGraph {
    edges: FxHashMap<TxnId, FxHashSet<TxnId>>,
}

impl WaitForGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the outgoing edges of `waiter`
    pub fn set_waits(&mut self, waiter: TxnId, holders: impl IntoIterator<Item = TxnId>) {
        let targets: FxHashSet<TxnId> = holders.into_iter().filter(|h| *h != waiter).collect();
        if targets.is_empty() {
            self.edges.remove(&waiter);
        } else {
            self.edges.insert(waiter, targets);
        }
    }

    /// Drop the outgoing edges of `waiter`
    pub fn clear_waits(&mut self, waiter: TxnId) {
        self.edges.remove(&waiter);
    }

    /// Drop every edge into or out of `txn`
    pub fn remove_txn(&mut self, txn: TxnId) {
        self.edges.remove(&txn);
        self.edges.retain(|_, targets| {
            targets.remove(&txn);
            !targets.is_empty()
        });
    }

    /// Transactions `waiter` currently waits for
    pub fn waits_for(&self, waiter: TxnId) -> Vec<TxnId> {
        let mut out: Vec<TxnId> = self
            .edges
            .get(&waiter)
            .map(|t| t.iter().copied().collect())
            .unwrap_or_default();
        out.sort();
        out
    }

    /// Number of transactions with outgoing edges
    pub fn waiter_count(&self) -> usize {
        self.edges.len()
    }

    /// True if following edges from `txn` leads back to `txn`
    pub fn in_cycle(&self, txn: TxnId) -> bool {
        let mut stack: Vec<TxnId> = match self.edges.get(&txn) {
            Some(targets) => targets.iter().copied().collect(),
            None => return false,
        };
        let mut seen = FxHashSet::default();

        while let Some(node) = stack.pop() {
            if node == txn {
                return true;
            }
            if !seen.insert(node) {
                continue;
            }
            if let Some(targets) = self.edges.get(&node) {
                stack.extend(targets.iter().copied());
            }
        }
        false
    }
}

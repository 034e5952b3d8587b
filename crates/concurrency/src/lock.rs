//! Blocking shared/exclusive lock table
//!
//! All per-item lock state lives behind one mutex, with one condition
//! variable for waiters:
//!
//! - grant decisions on an item are serialized with every other grant
//! - `release_all` drops all grants of a transaction in a single critical
//!   section, so no request can observe a half-released set
//! - a waiter re-checks its request whenever anything is released
//! - only admitted transactions are granted anything; `release_all` revokes
//!   admission, so a request racing with its own termination cannot block
//!
//! Per-item invariant: the holders of an item are either empty, all
//! `Shared`, or a single `Exclusive` holder.

use crate::deadlock::{Blocker, DeadlockPolicy, LockConflict, WaitDecision, WaitForGraph};
use crate::events::{ControlEvent, EventSink};
use lockstep_core::{AbortReason, Error, ItemKey, Result, Timestamp, TxnId};
use parking_lot::{Condvar, Mutex};
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;
use std::time::Instant;

/// Lock modes for read/write access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LockMode {
    /// Shared lock for reads (multiple readers allowed)
    Shared,
    /// Exclusive lock for writes (single writer, no readers)
    Exclusive,
}

impl LockMode {
    /// True if holding `self` already satisfies a request for `requested`
    #[inline]
    pub fn covers(self, requested: LockMode) -> bool {
        self == LockMode::Exclusive || requested == LockMode::Shared
    }
}

/// Observable lock state of one item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockState {
    /// No grants
    Free,
    /// `n >= 1` shared grants
    Shared(usize),
    /// One exclusive grant
    Exclusive(TxnId),
}

/// How an `acquire` call was satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquisition {
    /// The transaction already held a covering grant
    AlreadyHeld,
    /// A new grant (or upgrade) was recorded
    Granted {
        /// True if the request blocked before being granted
        waited: bool,
    },
}

#[derive(Debug, Clone, Copy)]
struct Grant {
    mode: LockMode,
    timestamp: Timestamp,
}

#[derive(Debug)]
struct TableState<K> {
    /// Item -> holders; entries are created on first request and kept
    items: FxHashMap<K, FxHashMap<TxnId, Grant>>,
    /// Transaction -> its grants, for release at termination
    held: FxHashMap<TxnId, FxHashMap<K, LockMode>>,
    /// Transactions currently blocked, and on which item
    waiting: FxHashMap<TxnId, K>,
    /// Transactions allowed to request locks, from `admit` to `release_all`
    admitted: FxHashSet<TxnId>,
    wait_for: WaitForGraph,
}

impl<K: ItemKey> TableState<K> {
    fn new() -> Self {
        TableState {
            items: FxHashMap::default(),
            held: FxHashMap::default(),
            waiting: FxHashMap::default(),
            admitted: FxHashSet::default(),
            wait_for: WaitForGraph::new(),
        }
    }

    fn mode_held(&self, txn: TxnId, key: &K) -> Option<LockMode> {
        self.held
            .get(&txn)
            .and_then(|grants| grants.get(key))
            .copied()
    }

    fn blockers(&self, txn: TxnId, key: &K, mode: LockMode) -> Vec<Blocker> {
        let Some(holders) = self.items.get(key) else {
            return Vec::new();
        };
        let mut blockers: Vec<Blocker> = holders
            .iter()
            .filter(|(holder, grant)| {
                **holder != txn
                    && (mode == LockMode::Exclusive || grant.mode == LockMode::Exclusive)
            })
            .map(|(holder, grant)| Blocker {
                txn: *holder,
                timestamp: grant.timestamp,
                mode: grant.mode,
            })
            .collect();
        blockers.sort_by_key(|b| b.timestamp);
        blockers
    }

    fn grant(&mut self, txn: TxnId, timestamp: Timestamp, key: &K, mode: LockMode) {
        let holders = self.items.entry(key.clone()).or_default();
        let grant = holders.entry(txn).or_insert(Grant { mode, timestamp });
        grant.mode = grant.mode.max(mode);
        let granted = grant.mode;
        self.held
            .entry(txn)
            .or_default()
            .insert(key.clone(), granted);
    }

    fn stop_waiting(&mut self, txn: TxnId) {
        self.waiting.remove(&txn);
        self.wait_for.clear_waits(txn);
    }
}

/// Lock table shared by every transaction of a strict 2PL controller
#[derive(Debug)]
pub struct LockTable<K> {
    state: Mutex<TableState<K>>,
    released: Condvar,
    policy: Arc<dyn DeadlockPolicy>,
    sink: Arc<dyn EventSink>,
}

impl<K: ItemKey> LockTable<K> {
    /// Create an empty table consulting `policy` whenever a request blocks
    pub fn new(policy: Arc<dyn DeadlockPolicy>, sink: Arc<dyn EventSink>) -> Self {
        LockTable {
            state: Mutex::new(TableState::new()),
            released: Condvar::new(),
            policy,
            sink,
        }
    }

    /// Deadlock policy in use
    pub fn policy(&self) -> &dyn DeadlockPolicy {
        self.policy.as_ref()
    }

    /// Allow `txn` to request locks until its next `release_all`
    pub fn admit(&self, txn: TxnId) {
        self.state.lock().admitted.insert(txn);
    }

    /// True if `txn` was admitted and not released since
    pub fn is_admitted(&self, txn: TxnId) -> bool {
        self.state.lock().admitted.contains(&txn)
    }

    /// Acquire (or upgrade to) `mode` on `key` for `txn`, blocking as needed
    ///
    /// # Errors
    ///
    /// `Error::Aborted` if the deadlock policy refuses to wait, the wait times
    /// out, or the transaction is not admitted. A transaction released while
    /// blocked, or before its request reached the table, gets
    /// `AbortReason::Cancelled`. An aborted request leaves no grant and no
    /// wait-for edge behind.
    pub fn acquire(
        &self,
        txn: TxnId,
        timestamp: Timestamp,
        key: &K,
        mode: LockMode,
    ) -> Result<Acquisition> {
        let mut state = self.state.lock();

        if !state.admitted.contains(&txn) {
            return Err(Error::aborted(txn, AbortReason::Cancelled));
        }
        let held = state.mode_held(txn, key);
        if held.is_some_and(|held| held.covers(mode)) {
            return Ok(Acquisition::AlreadyHeld);
        }
        state.items.entry(key.clone()).or_default();

        let mut waiting_since: Option<Instant> = None;
        let mut timed_out = false;

        loop {
            if !state.admitted.contains(&txn) {
                state.stop_waiting(txn);
                return Err(Error::aborted(txn, AbortReason::Cancelled));
            }

            let blockers = state.blockers(txn, key, mode);
            if blockers.is_empty() {
                state.grant(txn, timestamp, key, mode);
                let waited = waiting_since.is_some();
                if waited {
                    state.stop_waiting(txn);
                }
                return Ok(Acquisition::Granted { waited });
            }

            if timed_out {
                state.stop_waiting(txn);
                return Err(Error::aborted(txn, AbortReason::LockTimeout));
            }

            let since = match waiting_since {
                Some(since) => since,
                None => {
                    let now = Instant::now();
                    waiting_since = Some(now);
                    state.waiting.insert(txn, key.clone());
                    if self.sink.enabled() {
                        self.sink.emit(ControlEvent::Blocked {
                            txn,
                            item: format!("{:?}", key),
                            mode,
                            blockers: blockers.iter().map(|b| b.txn).collect(),
                        });
                    }
                    now
                }
            };
            let holders = blockers.iter().map(|b| b.txn);
            state.wait_for.set_waits(txn, holders);

            let decision = self.policy.on_conflict(&LockConflict {
                requester: txn,
                requester_ts: timestamp,
                mode,
                blockers: &blockers,
                waiting_since: since,
                wait_for: &state.wait_for,
            });

            match decision {
                WaitDecision::Abort(reason) => {
                    state.stop_waiting(txn);
                    return Err(Error::aborted(txn, reason));
                }
                WaitDecision::Wait { deadline: None } => {
                    self.released.wait(&mut state);
                }
                WaitDecision::Wait {
                    deadline: Some(deadline),
                } => {
                    let result = self.released.wait_until(&mut state, deadline);
                    timed_out = result.timed_out();
                }
            }
        }
    }

    /// Release every grant of `txn` at once and revoke its admission
    ///
    /// If `txn` is blocked in `acquire` on another thread, that call gives up
    /// with `AbortReason::Cancelled`, as does any later request until `txn` is
    /// admitted again. Returns the number of grants released; releasing a
    /// transaction that holds nothing is a no-op.
    pub fn release_all(&self, txn: TxnId) -> usize {
        let mut state = self.state.lock();

        let grants = state.held.remove(&txn).unwrap_or_default();
        for key in grants.keys() {
            if let Some(holders) = state.items.get_mut(key) {
                holders.remove(&txn);
            }
        }
        state.admitted.remove(&txn);
        state.wait_for.remove_txn(txn);
        drop(state);

        self.released.notify_all();
        grants.len()
    }

    /// Observable state of `key`
    pub fn state_of(&self, key: &K) -> LockState {
        let state = self.state.lock();
        let Some(holders) = state.items.get(key) else {
            return LockState::Free;
        };
        if let Some((txn, _)) = holders
            .iter()
            .find(|(_, grant)| grant.mode == LockMode::Exclusive)
        {
            return LockState::Exclusive(*txn);
        }
        match holders.len() {
            0 => LockState::Free,
            n => LockState::Shared(n),
        }
    }

    /// Holders of `key` and their modes, ordered by transaction ID
    pub fn holders(&self, key: &K) -> Vec<(TxnId, LockMode)> {
        let state = self.state.lock();
        let mut out: Vec<(TxnId, LockMode)> = state
            .items
            .get(key)
            .map(|h| h.iter().map(|(txn, g)| (*txn, g.mode)).collect())
            .unwrap_or_default();
        out.sort();
        out
    }

    /// Mode `txn` holds on `key`, if any
    pub fn mode_held(&self, txn: TxnId, key: &K) -> Option<LockMode> {
        self.state.lock().mode_held(txn, key)
    }

    /// Every grant currently held by `txn`
    pub fn held_by(&self, txn: TxnId) -> Vec<(K, LockMode)> {
        self.state
            .lock()
            .held
            .get(&txn)
            .map(|g| g.iter().map(|(k, m)| (k.clone(), *m)).collect())
            .unwrap_or_default()
    }

    /// Number of requests currently blocked
    pub fn waiting_count(&self) -> usize {
        self.state.lock().waiting.len()
    }

    /// Number of items that have ever been requested
    pub fn item_count(&self) -> usize {
        self.state.lock().items.len()
    }
}

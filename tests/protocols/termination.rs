//! Commit and Rollback
//!
//! Termination always reaches storage, releases controller state once, and
//! is safe to repeat.

use crate::common::*;
use lockstep::testing::{FaultyStore, StoreOp};
use lockstep::{
    ConcurrencyController, Error, MemoryStore, NoopSink, Protocol, Strict2PLController,
    ThomasTimestampController, TimestampController, TxnId, WaitIndefinitely,
};
use std::sync::Arc;

#[test]
fn rollback_undoes_writes_for_every_protocol() {
    for protocol in Protocol::ALL {
        let h = Harness::new(protocol);
        let txns = h.register(2);
        let (t1, t2) = (txns[0], txns[1]);

        h.cc.write(t1, "x", "kept").unwrap();
        h.cc.commit(t1).unwrap();

        h.cc.write(t2, "x", "discarded").unwrap();
        h.cc.write(t2, "y", "discarded").unwrap();
        h.cc.rollback(t2).unwrap();

        assert_eq!(h.store.get(&"x"), Some("kept"), "{}", protocol);
        assert_eq!(h.store.get(&"y"), None, "{}", protocol);
    }
}

/// Under timestamp ordering both writers touch `x` before either ends; once
/// both roll back, neither value may survive.
#[test]
fn overlapping_rollbacks_restore_last_committed_value() {
    for protocol in [Protocol::Timestamp, Protocol::TimestampTwr] {
        let h = Harness::new(protocol);
        let txns = h.register(3);
        let (t0, t1, t2) = (txns[0], txns[1], txns[2]);

        h.cc.write(t0, "x", "kept").unwrap();
        h.cc.commit(t0).unwrap();
        h.cc.write(t1, "x", "a").unwrap();
        h.cc.write(t2, "x", "b").unwrap();

        h.cc.rollback(t1).unwrap();
        assert_eq!(h.store.get(&"x"), Some("b"), "{}", protocol);
        h.cc.rollback(t2).unwrap();
        assert_eq!(h.store.get(&"x"), Some("kept"), "{}", protocol);

        // No committed value to fall back to
        let (t3, t4) = (fresh_txn(), fresh_txn());
        h.cc.register(t3).unwrap();
        h.cc.register(t4).unwrap();
        h.cc.write(t3, "y", "a").unwrap();
        h.cc.write(t4, "y", "b").unwrap();
        h.cc.rollback(t3).unwrap();
        h.cc.rollback(t4).unwrap();
        assert_eq!(h.store.get(&"y"), None, "{}", protocol);
    }
}

#[test]
fn repeated_termination_is_accepted_and_counted_once() {
    for protocol in Protocol::ALL {
        let h = Harness::new(protocol);
        let t1 = h.register(1)[0];
        h.cc.write(t1, "x", "v").unwrap();

        h.cc.commit(t1).unwrap();
        h.cc.commit(t1).unwrap();
        h.cc.rollback(t1).unwrap();

        let stats = h.cc.stats();
        assert_eq!(stats.committed, 1, "{}", protocol);
        assert_eq!(stats.rolled_back, 0, "{}", protocol);
        assert_eq!(stats.active(), 0, "{}", protocol);
        assert_eq!(h.store.get(&"x"), Some("v"), "{}", protocol);
        assert!(h.cc.read(t1, &"x").unwrap_err().is_invalid_txn());
    }
}

#[test]
fn terminated_id_can_be_registered_again() {
    for protocol in Protocol::ALL {
        let h = Harness::new(protocol);
        let txn = fresh_txn();
        let first = h.cc.register(txn).unwrap();
        assert!(h.cc.register(txn).unwrap_err().is_invalid_txn());

        h.cc.rollback(txn).unwrap();
        let second = h.cc.register(txn).unwrap();
        assert!(second > first, "{}", protocol);
    }
}

/// A failing storage commit is reported, yet every grant is released.
#[test]
fn storage_failure_on_commit_still_releases_locks() {
    let store: Arc<FaultyStore<Store>> = Arc::new(FaultyStore::new(MemoryStore::new()));
    let cc: Strict2PLController<&'static str, &'static str, _> =
        Strict2PLController::with_policy(
            Arc::clone(&store),
            Arc::new(WaitIndefinitely),
            Arc::new(NoopSink),
        );
    let (t1, t2) = (TxnId::new(1), TxnId::new(2));
    cc.register(t1).unwrap();
    cc.register(t2).unwrap();
    cc.write(t1, "x", "v").unwrap();

    store.fail_next(StoreOp::Commit, 1);
    assert!(matches!(cc.commit(t1).unwrap_err(), Error::Storage(_)));
    assert!(cc.lock_table().held_by(t1).is_empty());

    // Nothing left to wait for
    assert!(cc.write(t2, "x", "w").unwrap().is_applied());
    cc.commit(t2).unwrap();
    assert_eq!(store.calls(StoreOp::Commit), 2);
}

#[test]
fn storage_failure_on_write_leaves_timestamps_untouched() {
    let store: Arc<FaultyStore<Store>> = Arc::new(FaultyStore::new(MemoryStore::new()));
    let basic: TimestampController<&'static str, &'static str, _> =
        TimestampController::with_sink(Arc::clone(&store), Arc::new(NoopSink));
    let thomas: ThomasTimestampController<&'static str, &'static str, _> =
        ThomasTimestampController::with_sink(Arc::clone(&store), Arc::new(NoopSink));

    let controllers: [&dyn ConcurrencyController<&'static str, &'static str>; 2] =
        [&basic, &thomas];
    for cc in controllers {
        let txn = fresh_txn();
        cc.register(txn).unwrap();
        store.fail_next(StoreOp::Write, 1);
        let err = cc.write(txn, "x", "v").unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
        cc.rollback(txn).unwrap();
    }

    assert_eq!(basic.item_timestamps(&"x").write, None);
    assert_eq!(thomas.item_timestamps(&"x").write, None);
}

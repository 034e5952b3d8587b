//! Reference Schedules
//!
//! Timestamps are assigned in registration order starting at 0.

use crate::common::*;
use lockstep::{AbortReason, Protocol, Timestamp, TxnId, WriteOutcome};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

// ============================================================================
// Timestamp Ordering
// ============================================================================

#[test]
fn obsolete_write_aborts_under_basic_ordering() {
    let h = Harness::new(Protocol::Timestamp);
    let txns = h.register(2);
    let (t1, t2) = (txns[0], txns[1]);

    assert_eq!(h.cc.write(t1, "x", "a").unwrap(), WriteOutcome::Applied);
    assert_eq!(h.cc.write(t2, "x", "b").unwrap(), WriteOutcome::Applied);

    let err = h.cc.write(t1, "x", "c").unwrap_err();
    assert!(matches!(
        err.abort_reason(),
        Some(AbortReason::WriteTooLate { write_ts: Some(w), .. }) if *w == Timestamp::new(1)
    ));
    assert_eq!(h.store.get(&"x"), Some("b"));
}

#[test]
fn obsolete_write_skipped_under_thomas_rule() {
    let h = Harness::new(Protocol::TimestampTwr);
    let txns = h.register(2);
    let (t1, t2) = (txns[0], txns[1]);

    h.cc.write(t1, "x", "a").unwrap();
    h.cc.write(t2, "x", "b").unwrap();
    assert_eq!(h.cc.write(t1, "x", "c").unwrap(), WriteOutcome::Skipped);

    h.cc.commit(t1).unwrap();
    h.cc.commit(t2).unwrap();
    assert_eq!(h.store.get(&"x"), Some("b"));
    assert_eq!(h.cc.stats().skipped_writes, 1);
}

#[test]
fn write_behind_younger_read_aborts_in_both_orderings() {
    for protocol in [Protocol::Timestamp, Protocol::TimestampTwr] {
        let h = Harness::new(protocol);
        let txns = h.register(2);
        let (t1, t2) = (txns[0], txns[1]);

        assert_eq!(h.cc.read(t2, &"x").unwrap(), None);
        let err = h.cc.write(t1, "x", "z").unwrap_err();
        assert!(
            matches!(
                err.abort_reason(),
                Some(AbortReason::WriteTooLate { read_ts: Some(r), .. }) if *r == Timestamp::new(1)
            ),
            "{}: {:?}",
            protocol,
            err
        );
    }
}

// ============================================================================
// Strict 2PL
// ============================================================================

#[test]
fn shared_grants_coexist_and_writer_waits_for_release() {
    let h = Harness::new(Protocol::Strict2pl);
    let txns = h.register(2);
    let (t1, t2) = (txns[0], txns[1]);

    h.cc.read(t1, &"y").unwrap();
    h.cc.read(t2, &"y").unwrap();

    let (tx, rx) = mpsc::channel();
    let cc = h.cc.clone();
    let writer = thread::spawn(move || {
        let outcome = cc.write(t2, "y", "t2");
        tx.send(()).unwrap();
        outcome
    });

    wait_for_waiters(&h.events, 1);
    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());

    h.cc.commit(t1).unwrap();
    assert!(writer.join().unwrap().unwrap().is_applied());
    h.cc.commit(t2).unwrap();
    assert_eq!(h.store.get(&"y"), Some("t2"));
}

#[test]
fn exclusive_grant_blocks_reader_until_commit() {
    let h = Harness::new(Protocol::Strict2pl);
    let txns = h.register(2);
    let (t1, t2) = (txns[0], txns[1]);

    h.cc.write(t1, "y", "t1").unwrap();
    let reader = {
        let cc = h.cc.clone();
        thread::spawn(move || cc.read(t2, &"y"))
    };
    wait_for_waiters(&h.events, 1);

    h.cc.commit(t1).unwrap();
    assert_eq!(reader.join().unwrap().unwrap(), Some("t1"));
    h.cc.commit(t2).unwrap();
}

#[test]
fn exclusive_grant_blocks_writer_until_commit() {
    let h = Harness::new(Protocol::Strict2pl);
    let txns = h.register(2);
    let (t1, t2) = (txns[0], txns[1]);

    h.cc.write(t1, "y", "t1").unwrap();
    let writer = {
        let cc = h.cc.clone();
        thread::spawn(move || cc.write(t2, "y", "t2"))
    };
    wait_for_waiters(&h.events, 1);
    assert_eq!(h.store.get(&"y"), Some("t1"));

    h.cc.commit(t1).unwrap();
    assert!(writer.join().unwrap().unwrap().is_applied());
    h.cc.commit(t2).unwrap();
    assert_eq!(h.store.get(&"y"), Some("t2"));
}

// ============================================================================
// Unregistered Transactions
// ============================================================================

#[test]
fn unregistered_transaction_is_rejected_without_side_effects() {
    for protocol in Protocol::ALL {
        let h = Harness::new(protocol);
        let ghost = TxnId::new(77);

        assert!(h.cc.read(ghost, &"x").unwrap_err().is_invalid_txn());
        assert!(h.cc.write(ghost, "x", "boo").unwrap_err().is_invalid_txn());

        assert!(h.store.is_empty());
        assert!(h.events.events().is_empty());
        assert_eq!(h.cc.stats().aborts, 0);
    }
}

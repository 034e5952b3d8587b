//! Deadlock Policies
//!
//! Each strategy selectable from configuration, exercised on a real
//! two-transaction deadlock.

use crate::common::*;
use lockstep::{AbortReason, ControllerConfig, DeadlockStrategy, Protocol};
use std::thread;

fn config(deadlock: DeadlockStrategy, lock_timeout_ms: Option<u64>) -> ControllerConfig {
    ControllerConfig {
        protocol: Protocol::Strict2pl,
        deadlock,
        lock_timeout_ms,
    }
}

#[test]
fn detection_aborts_the_request_closing_the_cycle() {
    let h = Harness::with_config(config(DeadlockStrategy::Detect, None));
    let txns = h.register(2);
    let (t1, t2) = (txns[0], txns[1]);

    h.cc.write(t1, "a", "t1").unwrap();
    h.cc.write(t2, "b", "t2").unwrap();

    let first = {
        let cc = h.cc.clone();
        thread::spawn(move || cc.write(t1, "b", "t1"))
    };
    wait_for_waiters(&h.events, 1);

    let err = h.cc.write(t2, "a", "t2").unwrap_err();
    assert_eq!(err.abort_reason(), Some(&AbortReason::Deadlock));

    h.cc.rollback(t2).unwrap();
    assert!(first.join().unwrap().unwrap().is_applied());
    h.cc.commit(t1).unwrap();

    assert_eq!(h.store.get(&"a"), Some("t1"));
    assert_eq!(h.store.get(&"b"), Some("t1"));
}

#[test]
fn wait_die_lets_the_older_wait_and_kills_the_younger() {
    let h = Harness::with_config(config(DeadlockStrategy::WaitDie, None));
    let txns = h.register(2);
    let (older, younger) = (txns[0], txns[1]);

    h.cc.write(older, "a", "old").unwrap();
    h.cc.write(younger, "b", "young").unwrap();

    let waiting = {
        let cc = h.cc.clone();
        thread::spawn(move || cc.write(older, "b", "old"))
    };
    wait_for_waiters(&h.events, 1);

    let err = h.cc.read(younger, &"a").unwrap_err();
    assert_eq!(
        err.abort_reason(),
        Some(&AbortReason::WaitDie { blocker: older })
    );

    h.cc.rollback(younger).unwrap();
    assert!(waiting.join().unwrap().unwrap().is_applied());
    h.cc.commit(older).unwrap();
}

#[test]
fn timeout_aborts_a_stuck_waiter() {
    let h = Harness::with_config(config(DeadlockStrategy::Timeout, Some(20)));
    let txns = h.register(2);
    let (t1, t2) = (txns[0], txns[1]);

    h.cc.write(t1, "a", "t1").unwrap();
    let err = h.cc.read(t2, &"a").unwrap_err();
    assert_eq!(err.abort_reason(), Some(&AbortReason::LockTimeout));

    h.cc.rollback(t2).unwrap();
    h.cc.commit(t1).unwrap();
    assert_eq!(h.cc.stats().aborts, 1);
}

#[test]
fn rollback_cancels_a_blocked_request() {
    let h = Harness::with_config(config(DeadlockStrategy::None, None));
    let txns = h.register(2);
    let (t1, t2) = (txns[0], txns[1]);

    h.cc.write(t1, "a", "t1").unwrap();
    let blocked = {
        let cc = h.cc.clone();
        thread::spawn(move || cc.write(t2, "a", "t2"))
    };
    wait_for_waiters(&h.events, 1);

    h.cc.rollback(t2).unwrap();
    let err = blocked.join().unwrap().unwrap_err();
    assert_eq!(err.abort_reason(), Some(&AbortReason::Cancelled));

    h.cc.commit(t1).unwrap();
    assert_eq!(h.store.get(&"a"), Some("t1"));
}

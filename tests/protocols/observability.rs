//! Structured Events
//!
//! Controllers report through the injected sink; the default sink forwards
//! to `tracing` under the `lockstep::cc` target.

use crate::common::*;
use lockstep::{
    ConcurrencyController, ControlEvent, MemoryStore, Protocol, ThomasTimestampController,
    TracingSink, TxnId,
};
use std::sync::Arc;
use tracing::subscriber;
use tracing_subscriber::fmt;

#[test]
fn recorded_events_follow_the_transaction() {
    let h = Harness::new(Protocol::TimestampTwr);
    let txns = h.register(2);
    let (t1, t2) = (txns[0], txns[1]);

    h.cc.write(t2, "x", "b").unwrap();
    h.cc.write(t1, "x", "a").unwrap();
    assert!(h.cc.read(t1, &"x").unwrap_err().is_abort());
    h.cc.rollback(t1).unwrap();

    let events = h.events.events_for(t1);
    assert!(matches!(events[0], ControlEvent::Registered { .. }));
    assert!(matches!(events[1], ControlEvent::WriteSkipped { .. }));
    assert!(matches!(events[2], ControlEvent::Aborted { .. }));
    assert_eq!(
        events[3],
        ControlEvent::RolledBack {
            txn: t1,
            released: 0,
        }
    );
    assert_eq!(events.len(), 4);
}

#[test]
fn tracing_sink_writes_under_the_cc_target() {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let collector = fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();

    subscriber::with_default(collector, || {
        let cc: ThomasTimestampController<&'static str, &'static str, MemoryStore<_, _>> =
            ThomasTimestampController::with_sink(MemoryStore::new(), Arc::new(TracingSink));
        let (t1, t2) = (TxnId::new(1), TxnId::new(2));
        cc.register(t1).unwrap();
        cc.register(t2).unwrap();
        cc.write(t2, "x", "b").unwrap();
        cc.write(t1, "x", "a").unwrap();
        cc.commit(t1).unwrap();
        cc.commit(t2).unwrap();
    });

    let out = logs.contents();
    assert!(out.contains("lockstep::cc"));
    assert!(out.contains("obsolete write skipped"));
    assert!(out.contains("committed"));
}

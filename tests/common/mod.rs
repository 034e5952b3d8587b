//! Shared test utilities for the integration suites.
//!
//! Import via `mod common;` from any test's main.rs.

#![allow(dead_code)]

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Once};
use std::thread;
use std::time::Duration;

use lockstep::{
    build_controller, ConcurrencyController, ControllerConfig, MemoryStore, Protocol, RecordingSink,
    TxnId,
};
use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Initialization
// ============================================================================

static INIT_TRACING: Once = Once::new();

/// Install a test-writer subscriber once per test binary.
///
/// Honours `RUST_LOG`, e.g. `RUST_LOG=lockstep::cc=debug cargo test`.
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

static NEXT_TXN: AtomicU64 = AtomicU64::new(1_000_000);

/// Transaction ID not used by any other test in the binary
pub fn fresh_txn() -> TxnId {
    TxnId::new(NEXT_TXN.fetch_add(1, Ordering::Relaxed))
}

// ============================================================================
// Controller Harness
// ============================================================================

pub type Key = &'static str;
pub type Store = MemoryStore<Key, &'static str>;
pub type Controller = Arc<dyn ConcurrencyController<Key, &'static str>>;

/// Controller over a fresh `MemoryStore` with its recorded events
pub struct Harness {
    pub cc: Controller,
    pub store: Arc<Store>,
    pub events: Arc<RecordingSink>,
}

impl Harness {
    pub fn new(protocol: Protocol) -> Self {
        Self::with_config(ControllerConfig::for_protocol(protocol))
    }

    pub fn with_config(config: ControllerConfig) -> Self {
        init_tracing();
        let store = Arc::new(MemoryStore::new());
        let events = Arc::new(RecordingSink::new());
        let cc = build_controller(&config, Arc::clone(&store), events.clone()).unwrap();
        Harness {
            cc: Arc::from(cc),
            store,
            events,
        }
    }

    /// Register `count` transactions with IDs 1..=count
    pub fn register(&self, count: u64) -> Vec<TxnId> {
        (1..=count)
            .map(|raw| {
                let txn = TxnId::new(raw);
                self.cc.register(txn).unwrap();
                txn
            })
            .collect()
    }
}

/// Block until the lock-based controller reports `expected` waiters
pub fn wait_for_waiters(events: &RecordingSink, expected: usize) {
    for _ in 0..2000 {
        let blocked = events.count(|e| matches!(e, lockstep::ControlEvent::Blocked { .. }));
        if blocked >= expected {
            return;
        }
        thread::sleep(Duration::from_millis(1));
    }
    panic!("fewer than {} waiters after 2s", expected);
}

// ============================================================================
// Log Capture
// ============================================================================

/// `io::Write` target collecting formatted log output in memory
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

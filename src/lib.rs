//! Lockstep - pluggable transaction concurrency control
//!
//! A transaction driver registers each transaction, routes every read and
//! write through a [`ConcurrencyController`], and finally commits or rolls
//! back. Three protocols are available behind the same contract:
//! strict two-phase locking, basic timestamp ordering, and timestamp ordering
//! with the Thomas write rule.
//!
//! # Quick Start
//!
//! ```
//! use lockstep::{build_controller, ControllerConfig, MemoryStore, NoopSink, TxnId};
//! use std::sync::Arc;
//!
//! let config = ControllerConfig::from_toml_str("protocol = \"timestamp-twr\"").unwrap();
//! let store: MemoryStore<&str, i64> = MemoryStore::new();
//! let cc = build_controller(&config, store, Arc::new(NoopSink)).unwrap();
//!
//! let txn = TxnId::new(1);
//! cc.register(txn).unwrap();
//! cc.write(txn, "balance", 100).unwrap();
//! assert_eq!(cc.read(txn, &"balance").unwrap(), Some(100));
//! cc.commit(txn).unwrap();
//! ```
//!
//! # Architecture
//!
//! - `lockstep-core`: identifiers, timestamps, errors, the `Storage` trait
//! - `lockstep-storage`: in-memory store with per-transaction undo
//! - `lockstep-concurrency`: controllers, lock table, deadlock policies, config

pub use lockstep_concurrency::*;
pub use lockstep_core::{
    AbortReason, Error, ItemKey, Result, Storage, StorageError, StorageResult, Timestamp, TxnId,
};
pub use lockstep_storage::{testing, MemoryStore};

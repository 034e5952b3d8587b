//! Testing utilities for the storage collaborator
//!
//! - **FaultyStore**: wraps any store and injects failures into chosen
//!   operations, counting how often each operation was reached
//!
//! # Example
//!
//! ```
//! use lockstep_core::{Storage, TxnId};
//! use lockstep_storage::testing::{FaultyStore, StoreOp};
//! use lockstep_storage::MemoryStore;
//!
//! let store = FaultyStore::new(MemoryStore::<u32, u32>::new());
//! store.fail_next(StoreOp::Write, 1);
//! assert!(store.write(TxnId::new(1), 1, 1).is_err());
//! assert!(store.write(TxnId::new(1), 1, 1).is_ok());
//! ```

mod faulty;

pub use faulty::{FaultyStore, StoreOp};

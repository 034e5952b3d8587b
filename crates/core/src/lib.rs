//! Core types and traits for lockstep
//!
//! This crate defines the foundational types shared by the concurrency
//! controllers and the storage layer:
//! - TxnId: Driver-assigned transaction identifier
//! - Timestamp: Logical time assigned at registration
//! - ItemKey: Bound satisfied by every data-item key type
//! - Error: Error taxonomy (invalid transaction, abort, storage failure)
//! - Storage: The storage collaborator consulted once an access is granted

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod traits;
pub mod types;

pub use error::{AbortReason, Error, Result, StorageError, StorageResult};
pub use traits::Storage;
pub use types::{ItemKey, Timestamp, TxnId};

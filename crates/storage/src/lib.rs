//! Storage layer for lockstep
//!
//! This crate provides the storage collaborator the controllers delegate to:
//! - MemoryStore: DashMap-backed store with per-transaction undo
//! - testing::FaultyStore: fault-injecting wrapper for failure-path tests
//!
//! Durability is out of scope; values live only in memory.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod memory;
pub mod testing;

pub use memory::MemoryStore;

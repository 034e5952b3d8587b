//! Concurrency control for lockstep
//!
//! This crate implements the controllers a transaction driver consults before
//! every data access:
//! - Strict2PLController: shared/exclusive locks held until termination
//! - TimestampController: basic timestamp ordering
//! - ThomasTimestampController: timestamp ordering with the Thomas write rule
//! - LockTable and DeadlockPolicy: blocking grants with pluggable deadlock handling
//! - ControllerConfig: TOML-driven selection of protocol and policy
//!
//! All controllers are synchronous and shared across threads behind `&self`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod controller;
pub mod deadlock;
pub mod events;
pub mod lock;
pub mod registry;
pub mod stats;
pub mod strict2pl;
pub mod timestamp;

pub use config::{build_controller, ControllerConfig, DeadlockStrategy, CONFIG_FILE_NAME};
pub use controller::{ConcurrencyController, Protocol, WriteOutcome};
pub use deadlock::{
    Blocker, CycleDetection, DeadlockPolicy, LockConflict, TimeoutPolicy, WaitDecision, WaitDie,
    WaitForGraph, WaitIndefinitely,
};
pub use events::{Access, ControlEvent, EventSink, NoopSink, RecordingSink, TracingSink};
pub use lock::{Acquisition, LockMode, LockState, LockTable};
pub use registry::{ItemTable, TransactionRegistry};
pub use stats::{ControllerStats, StatsSnapshot};
pub use strict2pl::Strict2PLController;
pub use timestamp::{
    BasicWriteRule, ItemTimestamps, ThomasTimestampController, ThomasWriteRule, TimestampController,
    WriteRule, WriteVerdict,
};

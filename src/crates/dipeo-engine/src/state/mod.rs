//! Execution state: immutable snapshots plus the event-sourced manager
//! that folds the event log into them (spec §3, §4.2).

pub mod manager;
pub mod snapshot;

pub use manager::StateManager;
pub use snapshot::{ExecutionSnapshot, ExecutionStatus, NodeState};

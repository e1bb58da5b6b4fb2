//! # dipeo-storage
//!
//! Durable persistence for execution snapshots, kept as its own crate
//! because it is an optional, swappable backend behind a trait: a
//! `dipeo-engine` `StateManager` can run entirely in-memory, or be
//! handed a [`SnapshotStore`] to checkpoint to on a configurable
//! cadence (every N events, or on terminal events only) without the
//! engine core ever depending on a concrete storage technology.
//!
//! ## Backends
//!
//! - [`memory::InMemorySnapshotStore`] — always available, ephemeral,
//!   for tests and single-process development.
//! - [`sqlite::SqliteSnapshotStore`] — behind the `sqlite` feature, for
//!   deployments that must survive a process restart.
//!
//! ```rust
//! use dipeo_storage::{InMemorySnapshotStore, SnapshotRecord, SnapshotStore};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let store = InMemorySnapshotStore::new();
//! store.put(SnapshotRecord::new("exec_abc", 1, b"snapshot-bytes".to_vec())).await.unwrap();
//! let latest = store.get_latest("exec_abc").await.unwrap();
//! assert!(latest.is_some());
//! # }
//! ```

pub mod error;
pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod serializer;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::InMemorySnapshotStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteSnapshotStore;
pub use serializer::{BincodeSerializer, JsonSerializer, SerializerProtocol};
pub use traits::{SnapshotRecord, SnapshotStore};

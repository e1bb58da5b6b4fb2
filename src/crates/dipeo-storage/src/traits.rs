//! [`SnapshotStore`] - the storage abstraction a `StateManager` writes
//! execution snapshots through on a configurable cadence, rather than
//! on every event (durable persistence is a periodic side effect of
//! state management, not part of it).
//!
//! The store is deliberately opaque to the shape of what it persists:
//! callers hand it pre-serialized bytes plus a small amount of
//! addressing metadata (`execution_id`, `seq`), so this crate never
//! depends on `dipeo-engine`'s types and a backend can be swapped for
//! any key-value-with-history store.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One persisted snapshot: the execution it belongs to, the event
/// `seq` it was taken at (so a reader can tell how stale it is
/// relative to the live event log), the serialized snapshot body, and
/// when it was written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub execution_id: String,
    pub seq: u64,
    pub body: Vec<u8>,
    pub created_at: String,
}

impl SnapshotRecord {
    pub fn new(execution_id: impl Into<String>, seq: u64, body: Vec<u8>) -> Self {
        Self { execution_id: execution_id.into(), seq, body, created_at: chrono::Utc::now().to_rfc3339() }
    }
}

/// Durable snapshot storage backend.
///
/// Implementations must treat `put` as an append: a store may keep
/// only the latest record per execution or the full history, but
/// `get_latest` must always return the record with the highest `seq`
/// that has been `put` for that execution.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn put(&self, record: SnapshotRecord) -> Result<()>;

    async fn get_latest(&self, execution_id: &str) -> Result<Option<SnapshotRecord>>;

    async fn list(&self, execution_id: &str) -> Result<Vec<SnapshotRecord>>;

    async fn delete(&self, execution_id: &str) -> Result<()>;
}

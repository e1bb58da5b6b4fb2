//! In-memory [`SnapshotStore`] for development and tests.
//!
//! Keeps the full history per execution in a `RwLock<HashMap<...,
//! Vec<...>>>`. Data does not survive process restart; use
//! [`crate::sqlite::SqliteSnapshotStore`] (feature `sqlite`) where
//! that matters.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::traits::{SnapshotRecord, SnapshotStore};

#[derive(Default)]
pub struct InMemorySnapshotStore {
    records: Arc<RwLock<HashMap<String, Vec<SnapshotRecord>>>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every stored record. Test-isolation helper.
    pub async fn clear(&self) {
        self.records.write().await.clear();
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn put(&self, record: SnapshotRecord) -> Result<()> {
        self.records.write().await.entry(record.execution_id.clone()).or_default().push(record);
        Ok(())
    }

    async fn get_latest(&self, execution_id: &str) -> Result<Option<SnapshotRecord>> {
        Ok(self.records.read().await.get(execution_id).and_then(|history| history.iter().max_by_key(|r| r.seq).cloned()))
    }

    async fn list(&self, execution_id: &str) -> Result<Vec<SnapshotRecord>> {
        Ok(self.records.read().await.get(execution_id).cloned().unwrap_or_default())
    }

    async fn delete(&self, execution_id: &str) -> Result<()> {
        self.records.write().await.remove(execution_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_latest_returns_the_highest_seq() {
        let store = InMemorySnapshotStore::new();
        store.put(SnapshotRecord::new("exec_a", 1, vec![1])).await.unwrap();
        store.put(SnapshotRecord::new("exec_a", 3, vec![3])).await.unwrap();
        store.put(SnapshotRecord::new("exec_a", 2, vec![2])).await.unwrap();

        let latest = store.get_latest("exec_a").await.unwrap().unwrap();
        assert_eq!(latest.seq, 3);
    }

    #[tokio::test]
    async fn unknown_execution_has_no_latest_snapshot() {
        let store = InMemorySnapshotStore::new();
        assert!(store.get_latest("exec_missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_clears_an_executions_history() {
        let store = InMemorySnapshotStore::new();
        store.put(SnapshotRecord::new("exec_a", 1, vec![1])).await.unwrap();
        store.delete("exec_a").await.unwrap();
        assert!(store.list("exec_a").await.unwrap().is_empty());
    }
}

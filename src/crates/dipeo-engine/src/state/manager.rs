//! Event-sourced state management (spec §4.2).
//!
//! `apply_event` is the only mutation path. Snapshots are pure folds
//! over the append-only event log, so [`StateManager::rebuild`] always
//! agrees with the cached snapshot at the same version (spec §8
//! invariant 6).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use crate::envelope::TokenUsage;
use crate::error::{EngineError, Result};
use crate::event::types::{DomainEvent, EventType};
use crate::ids::{ExecutionId, NodeId};

use super::snapshot::{ExecutionSnapshot, ExecutionStatus, NodeState};

struct ExecutionRecord {
    events: Vec<DomainEvent>,
    snapshot: ExecutionSnapshot,
    /// Highest `seq` applied, for idempotent re-application
    /// (spec §8 "Applying the same event twice ... is a no-op").
    applied_seqs: std::collections::HashSet<u64>,
}

/// Cadence and backend for periodic checkpointing to durable storage
/// (spec §4.2 supplement: `StateManager` writes to a `SnapshotStore`
/// every N events or on a terminal event, not on every event — the
/// checkpointer is invoked once per superstep, not per mutation).
#[cfg(feature = "storage")]
#[derive(Clone)]
struct Checkpointing {
    store: Arc<dyn dipeo_storage::SnapshotStore>,
    every: u64,
}

/// Owns the event log and the cached-snapshot per execution
/// (spec §3 "Ownership").
#[derive(Clone, Default)]
pub struct StateManager {
    executions: Arc<Mutex<HashMap<ExecutionId, ExecutionRecord>>>,
    #[cfg(feature = "storage")]
    checkpointing: Option<Checkpointing>,
}

impl StateManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// A `StateManager` that checkpoints the folded snapshot to `store`
    /// every `checkpoint_every` applied events, plus on every terminal
    /// (`EXECUTION_COMPLETED`/`EXECUTION_ERROR`) event regardless of
    /// cadence.
    #[cfg(feature = "storage")]
    pub fn with_snapshot_store(store: Arc<dyn dipeo_storage::SnapshotStore>, checkpoint_every: u64) -> Self {
        Self {
            executions: Arc::default(),
            checkpointing: Some(Checkpointing { store, every: checkpoint_every.max(1) }),
        }
    }

    fn begin(&self, execution_id: ExecutionId, parent_execution_id: Option<ExecutionId>) {
        let mut guard = self.executions.lock();
        guard.entry(execution_id.clone()).or_insert_with(|| ExecutionRecord {
            events: Vec::new(),
            snapshot: ExecutionSnapshot::new(execution_id, parent_execution_id),
            applied_seqs: std::collections::HashSet::new(),
        });
    }

    /// Apply one event, folding it into the cached snapshot. Concurrent
    /// calls for the same execution serialize on the internal lock
    /// (spec §4.2 "Concurrent apply_event calls serialize").
    pub fn apply_event(&self, event: DomainEvent) -> Result<()> {
        let execution_id = event.scope.execution_id.clone();
        self.begin(execution_id.clone(), event.scope.parent_execution_id.clone());

        let mut guard = self.executions.lock();
        let record = guard
            .get_mut(&execution_id)
            .ok_or_else(|| EngineError::Infrastructure(format!("unknown execution '{execution_id}'")))?;

        if !record.applied_seqs.insert(event.meta.seq) {
            return Ok(());
        }

        fold_event(&mut record.snapshot, &event);
        record.snapshot.version += 1;
        #[cfg(feature = "storage")]
        let is_terminal = matches!(event.event_type, EventType::ExecutionCompleted | EventType::ExecutionError);
        record.events.push(event);

        #[cfg(feature = "storage")]
        {
            let events_applied = record.events.len() as u64;
            if let Some(checkpointing) = &self.checkpointing {
                if is_terminal || events_applied % checkpointing.every == 0 {
                    self.checkpoint(checkpointing.clone(), record.snapshot.clone());
                }
            }
        }

        Ok(())
    }

    /// Serialize and hand the snapshot to the `SnapshotStore` off the
    /// calling task, so a slow or unavailable backend never blocks
    /// `apply_event` (spec §4.2 "Publication failures are logged but
    /// never crash the engine" applies equally to checkpoint writes).
    #[cfg(feature = "storage")]
    fn checkpoint(&self, checkpointing: Checkpointing, snapshot: ExecutionSnapshot) {
        let execution_id = snapshot.execution_id.to_string();
        let seq = snapshot.version;
        tokio::spawn(async move {
            use dipeo_storage::SerializerProtocol;
            let body = match dipeo_storage::JsonSerializer.dumps(&snapshot) {
                Ok(body) => body,
                Err(err) => {
                    warn!(error = %err, %execution_id, "failed to serialize snapshot for checkpointing");
                    return;
                }
            };
            let record = dipeo_storage::SnapshotRecord::new(execution_id.clone(), seq, body);
            if let Err(err) = checkpointing.store.put(record).await {
                warn!(error = %err, %execution_id, "failed to write checkpoint to snapshot store");
            }
        });
    }

    pub fn get_state(&self, execution_id: &ExecutionId) -> Option<ExecutionSnapshot> {
        self.executions.lock().get(execution_id).map(|r| r.snapshot.clone())
    }

    pub fn get_node_state(&self, execution_id: &ExecutionId, node_id: &NodeId) -> Option<NodeState> {
        self.executions.lock().get(execution_id).and_then(|r| r.snapshot.node_state(node_id).cloned())
    }

    pub fn get_events(&self, execution_id: &ExecutionId, after_version: u64) -> Vec<DomainEvent> {
        self.executions
            .lock()
            .get(execution_id)
            .map(|r| r.events.iter().filter(|e| e.meta.seq > after_version).cloned().collect())
            .unwrap_or_default()
    }

    pub fn clear_execution(&self, execution_id: &ExecutionId) {
        self.executions.lock().remove(execution_id);
    }

    /// Rebuild a snapshot from scratch by replaying the log
    /// (spec §8 invariant 6, used by tests and by durable-storage
    /// recovery).
    pub fn rebuild(&self, execution_id: &ExecutionId) -> Option<ExecutionSnapshot> {
        let guard = self.executions.lock();
        let record = guard.get(execution_id)?;
        let mut snapshot = ExecutionSnapshot::new(execution_id.clone(), record.snapshot.parent_execution_id.clone());
        for event in &record.events {
            fold_event(&mut snapshot, event);
            snapshot.version += 1;
        }
        Some(snapshot)
    }
}

fn fold_event(snapshot: &mut ExecutionSnapshot, event: &DomainEvent) {
    match event.event_type {
        EventType::ExecutionStarted => {
            snapshot.status = ExecutionStatus::Running;
            snapshot.start_time = chrono::Utc::now();
        }
        EventType::ExecutionCompleted => {
            snapshot.status = ExecutionStatus::Completed;
            snapshot.end_time = Some(chrono::Utc::now());
        }
        EventType::ExecutionError => {
            snapshot.status = event
                .payload
                .get("error_type")
                .and_then(|v| v.as_str())
                .filter(|t| *t == "Aborted")
                .map(|_| ExecutionStatus::Aborted)
                .unwrap_or(ExecutionStatus::Failed);
            snapshot.end_time = Some(chrono::Utc::now());
            snapshot.error = event.payload.get("error_message").and_then(|v| v.as_str()).map(String::from);
        }
        EventType::NodeStarted => {
            if let Some(node_id) = event.node_id() {
                let state = snapshot.node_states.entry(node_id).or_default();
                state.status = Some(ExecutionStatus::Running);
                state.start_time = Some(chrono::Utc::now());
                state.execution_count += 1;
            }
        }
        EventType::NodeCompleted => {
            if let Some(node_id) = event.node_id() {
                let state = snapshot.node_states.entry(node_id).or_default();
                let status_str = event.payload.get("status").and_then(|v| v.as_str()).unwrap_or("COMPLETED");
                state.status = Some(parse_status(status_str));
                state.end_time = Some(chrono::Utc::now());
                if let Some(usage) = event.payload.get("token_usage") {
                    state.token_usage = serde_json::from_value::<TokenUsage>(usage.clone()).ok();
                }
            }
        }
        EventType::NodeError => {
            if let Some(node_id) = event.node_id() {
                let state = snapshot.node_states.entry(node_id).or_default();
                state.status = Some(ExecutionStatus::Failed);
                state.end_time = Some(chrono::Utc::now());
                state.error = event.payload.get("error_message").and_then(|v| v.as_str()).map(String::from);
            }
        }
    }
}

fn parse_status(raw: &str) -> ExecutionStatus {
    match raw {
        "SKIPPED" => ExecutionStatus::Skipped,
        "MAXITER_REACHED" => ExecutionStatus::MaxiterReached,
        _ => ExecutionStatus::Completed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::types::{EventMeta, EventScope};

    fn event(execution_id: &ExecutionId, seq: u64, event_type: EventType, payload: serde_json::Value) -> DomainEvent {
        DomainEvent {
            event_type,
            scope: EventScope { execution_id: execution_id.clone(), parent_execution_id: None },
            payload,
            meta: EventMeta { seq, pipeline_event_count: seq, pipeline_uptime_ms: 0 },
        }
    }

    #[test]
    fn applying_same_seq_twice_is_a_no_op() {
        let manager = StateManager::new();
        let exec_id = ExecutionId::generate();
        let evt = event(&exec_id, 1, EventType::ExecutionStarted, serde_json::json!({}));
        manager.apply_event(evt.clone()).unwrap();
        manager.apply_event(evt).unwrap();
        let snapshot = manager.get_state(&exec_id).unwrap();
        assert_eq!(snapshot.version, 1);
    }

    #[test]
    fn rebuild_matches_cached_snapshot() {
        let manager = StateManager::new();
        let exec_id = ExecutionId::generate();
        manager.apply_event(event(&exec_id, 1, EventType::ExecutionStarted, serde_json::json!({}))).unwrap();
        manager
            .apply_event(event(&exec_id, 2, EventType::NodeStarted, serde_json::json!({"node_id": "n1"})))
            .unwrap();
        let cached = manager.get_state(&exec_id).unwrap();
        let rebuilt = manager.rebuild(&exec_id).unwrap();
        assert_eq!(cached.version, rebuilt.version);
        assert_eq!(cached.node_states.len(), rebuilt.node_states.len());
    }

    #[test]
    fn node_started_increments_execution_count() {
        let manager = StateManager::new();
        let exec_id = ExecutionId::generate();
        let node_id = NodeId::new("n1");
        manager.apply_event(event(&exec_id, 1, EventType::NodeStarted, serde_json::json!({"node_id": "n1"}))).unwrap();
        manager.apply_event(event(&exec_id, 2, EventType::NodeStarted, serde_json::json!({"node_id": "n1"}))).unwrap();
        let state = manager.get_node_state(&exec_id, &node_id).unwrap();
        assert_eq!(state.execution_count, 2);
    }

    #[cfg(feature = "storage")]
    #[tokio::test]
    async fn checkpoints_to_snapshot_store_on_cadence_and_terminal_events() {
        let store = Arc::new(dipeo_storage::InMemorySnapshotStore::new());
        let manager = StateManager::with_snapshot_store(store.clone() as Arc<dyn dipeo_storage::SnapshotStore>, 2);
        let exec_id = ExecutionId::generate();

        manager.apply_event(event(&exec_id, 1, EventType::ExecutionStarted, serde_json::json!({}))).unwrap();
        manager.apply_event(event(&exec_id, 2, EventType::NodeStarted, serde_json::json!({"node_id": "n1"}))).unwrap();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        let checkpoints = store.list(exec_id.as_str()).await.unwrap();
        assert_eq!(checkpoints.len(), 1, "cadence of 2 should checkpoint on the 2nd event");

        manager
            .apply_event(event(&exec_id, 3, EventType::ExecutionError, serde_json::json!({"error_message": "boom", "error_type": "Timeout"})))
            .unwrap();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        let checkpoints = store.list(exec_id.as_str()).await.unwrap();
        assert_eq!(checkpoints.len(), 2, "a terminal event checkpoints regardless of cadence");
    }
}

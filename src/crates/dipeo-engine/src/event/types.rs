//! The domain event log (spec §3 "Event log", §6 "Event stream").

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{ExecutionId, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    ExecutionStarted,
    ExecutionCompleted,
    ExecutionError,
    NodeStarted,
    NodeCompleted,
    NodeError,
}

/// Identifies which execution (and, for sub-diagrams, which parent) an
/// event belongs to (spec §4.3 "Parent linkage").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventScope {
    pub execution_id: ExecutionId,
    pub parent_execution_id: Option<ExecutionId>,
}

/// Bookkeeping the pipeline stamps on every event (spec §4.3 step d).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMeta {
    /// Monotonic per execution, starting at 1, with no gaps
    /// (spec §8 invariant 1).
    pub seq: u64,
    pub pipeline_event_count: u64,
    pub pipeline_uptime_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub scope: EventScope,
    pub payload: Value,
    pub meta: EventMeta,
}

impl DomainEvent {
    pub fn node_id(&self) -> Option<NodeId> {
        self.payload.get("node_id").and_then(|v| v.as_str()).map(NodeId::new)
    }
}

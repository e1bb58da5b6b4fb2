//! Execution state snapshots (spec §3 "Execution state (snapshot)").

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::envelope::TokenUsage;
use crate::ids::{ExecutionId, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Aborted,
    Skipped,
    MaxiterReached,
}

impl ExecutionStatus {
    /// Terminal statuses a node or execution does not leave on its own
    /// (spec §8 invariant 4).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed
                | ExecutionStatus::Failed
                | ExecutionStatus::Aborted
                | ExecutionStatus::Skipped
                | ExecutionStatus::MaxiterReached
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeState {
    pub status: Option<ExecutionStatus>,
    pub execution_count: u32,
    pub start_time: Option<chrono::DateTime<chrono::Utc>>,
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,
    pub error: Option<String>,
    pub token_usage: Option<TokenUsage>,
}

/// Immutable snapshot of an execution at a given `version` (spec §3).
/// Every mutation produces a new snapshot rather than editing this one
/// in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSnapshot {
    pub execution_id: ExecutionId,
    pub status: ExecutionStatus,
    pub start_time: chrono::DateTime<chrono::Utc>,
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,
    pub error: Option<String>,
    pub node_states: HashMap<NodeId, NodeState>,
    pub parent_execution_id: Option<ExecutionId>,
    pub version: u64,
}

impl ExecutionSnapshot {
    pub fn new(execution_id: ExecutionId, parent_execution_id: Option<ExecutionId>) -> Self {
        Self {
            execution_id,
            status: ExecutionStatus::Pending,
            start_time: chrono::Utc::now(),
            end_time: None,
            error: None,
            node_states: HashMap::new(),
            parent_execution_id,
            version: 0,
        }
    }

    pub fn node_state(&self, node_id: &NodeId) -> Option<&NodeState> {
        self.node_states.get(node_id)
    }
}

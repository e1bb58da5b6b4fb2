//! Ready-node selection (spec §4.6).

use std::collections::{HashMap, HashSet};

use crate::diagram::ExecutableDiagram;
use crate::ids::NodeId;
use crate::token::TokenManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// More nodes may still become ready; keep ticking.
    Continue,
    /// No ready nodes, nothing in flight, and every node either ran to
    /// completion or was never reachable — execution is done.
    Complete,
    /// No ready nodes, nothing in flight, but unreached nodes remain
    /// with incoming edges that never got a token.
    Deadlock { stuck_nodes: Vec<NodeId> },
}

/// Per-node counters the scheduler consults alongside token state:
/// how many times a node has run, and whether it's currently in
/// flight.
#[derive(Default)]
pub struct SchedulerState {
    pub execution_counts: HashMap<NodeId, u32>,
    pub in_flight: std::collections::HashSet<NodeId>,
    pub ran_at_least_once: std::collections::HashSet<NodeId>,
}

pub struct Scheduler<'a> {
    diagram: &'a ExecutableDiagram,
}

impl<'a> Scheduler<'a> {
    pub fn new(diagram: &'a ExecutableDiagram) -> Self {
        Self { diagram }
    }

    /// Select the next batch of ready nodes (spec §4.6 `next_ready_batch`).
    /// `max_iteration` lookups are the caller's (engine's) responsibility
    /// via `at_max_iteration`, since only handlers know each node's cap.
    pub fn next_ready_batch(
        &self,
        tokens: &TokenManager,
        state: &SchedulerState,
        at_max_iteration: impl Fn(&NodeId, u32) -> bool,
    ) -> Vec<NodeId> {
        let mut ready: Vec<&NodeId> = self
            .diagram
            .nodes()
            .iter()
            .map(|n| &n.id)
            .filter(|id| !state.in_flight.contains(*id))
            .filter(|id| {
                let count = state.execution_counts.get(*id).copied().unwrap_or(0);
                !at_max_iteration(id, count)
            })
            .filter(|id| {
                let node = self.diagram.node(id).expect("node exists in its own diagram");
                let count = state.execution_counts.get(*id).copied().unwrap_or(0);
                tokens.is_ready(self.diagram, node, count)
            })
            .collect();

        ready.sort_by_key(|id| (self.diagram.topo_index(id), id.as_str().to_string()));
        ready.into_iter().cloned().collect()
    }

    /// Decide what an empty ready batch with nothing in flight means
    /// (spec §4.6 "Deadlock detection").
    ///
    /// A node that never ran is only a genuine deadlock if some input
    /// group could still conceivably be satisfied later (its unmet
    /// edges' sources haven't run yet, or are themselves undecided).
    /// If every edge in some required group has no token *and* its
    /// source has already run (or is itself permanently unreachable),
    /// that group — and so the node — can never fire; this is the
    /// unreached side of a `Condition` branch (spec §4.5 "the other
    /// branch's downstream nodes remain unready ... or not at all, by
    /// design"), not a deadlock. The fixed point below propagates that
    /// unreachability transitively before classifying what's left.
    pub fn outcome_on_stall(&self, tokens: &TokenManager, state: &SchedulerState) -> TickOutcome {
        let mut unreachable: HashSet<NodeId> = HashSet::new();
        loop {
            let mut changed = false;
            for node in self.diagram.nodes() {
                if state.ran_at_least_once.contains(&node.id) || unreachable.contains(&node.id) {
                    continue;
                }

                let mut by_key: HashMap<&str, Vec<_>> = HashMap::new();
                for edge in self.diagram.incoming_edges(&node.id) {
                    by_key.entry(edge.target_input_key.as_str()).or_default().push(edge);
                }
                if by_key.is_empty() {
                    continue;
                }

                let dead_group = by_key.values().any(|edges| {
                    edges.iter().all(|e| {
                        !tokens.has_token(&e.id)
                            && (state.ran_at_least_once.contains(&e.source_node_id) || unreachable.contains(&e.source_node_id))
                    })
                });

                if dead_group && unreachable.insert(node.id.clone()) {
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        let stuck: Vec<NodeId> = self
            .diagram
            .nodes()
            .iter()
            .map(|n| &n.id)
            .filter(|id| !state.ran_at_least_once.contains(*id) && !unreachable.contains(*id))
            .filter(|id| self.diagram.incoming_edges(id).next().is_some())
            .cloned()
            .collect();

        if stuck.is_empty() {
            TickOutcome::Complete
        } else {
            TickOutcome::Deadlock { stuck_nodes: stuck }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagram::{compile, AuthoredArrow, AuthoredNode, DiagramMetadata, DomainDiagram};

    fn node(id: &str, kind: &str, data: serde_json::Value) -> AuthoredNode {
        AuthoredNode { id: id.to_string(), kind: kind.to_string(), label: None, data }
    }

    fn arrow(id: &str, source: &str, target: &str) -> AuthoredArrow {
        AuthoredArrow { id: id.to_string(), source: source.to_string(), target: target.to_string(), content_type: None, label: None }
    }

    #[test]
    fn entry_node_is_ready_on_first_tick() {
        let diagram = compile(&DomainDiagram {
            nodes: vec![node("start", "Start", serde_json::json!({}))],
            arrows: vec![],
            metadata: DiagramMetadata::default(),
        })
        .unwrap();
        let scheduler = Scheduler::new(&diagram);
        let tokens = TokenManager::new();
        let state = SchedulerState::default();
        let batch = scheduler.next_ready_batch(&tokens, &state, |_, _| false);
        assert_eq!(batch, vec![NodeId::new("start")]);
    }

    #[test]
    fn deadlock_detected_when_mutual_dependency_never_fires() {
        let diagram = compile(&DomainDiagram {
            nodes: vec![
                node("a", "CodeJob", serde_json::json!({"language": "python", "code": "1"})),
                node("b", "CodeJob", serde_json::json!({"language": "python", "code": "1"})),
            ],
            arrows: vec![
                arrow("e1", "a:default:output", "b:default:input"),
                arrow("e2", "b:default:output", "a:default:input"),
            ],
            metadata: DiagramMetadata::default(),
        })
        .unwrap();
        let scheduler = Scheduler::new(&diagram);
        let tokens = TokenManager::new();
        let state = SchedulerState::default();
        assert_eq!(
            scheduler.outcome_on_stall(&tokens, &state),
            TickOutcome::Deadlock { stuck_nodes: vec![NodeId::new("a"), NodeId::new("b")] }
        );
    }

    #[test]
    fn unreached_condition_branch_is_not_a_deadlock() {
        let diagram = compile(&DomainDiagram {
            nodes: vec![
                node("cond", "Condition", serde_json::json!({"condition_type": "expression", "expression": "true"})),
                node("a", "CodeJob", serde_json::json!({"language": "python", "code": "1"})),
                node("b", "CodeJob", serde_json::json!({"language": "python", "code": "1"})),
            ],
            arrows: vec![
                arrow("e1", "cond:condtrue:output", "a:default:input"),
                arrow("e2", "cond:condfalse:output", "b:default:input"),
            ],
            metadata: DiagramMetadata::default(),
        })
        .unwrap();
        let scheduler = Scheduler::new(&diagram);
        let tokens = TokenManager::new();
        let mut state = SchedulerState::default();
        state.ran_at_least_once.insert(NodeId::new("cond"));
        state.ran_at_least_once.insert(NodeId::new("a"));

        assert_eq!(scheduler.outcome_on_stall(&tokens, &state), TickOutcome::Complete);
    }
}

//! Token-flow readiness tracking (spec §4.5).
//!
//! An edge "has a token" once its source has produced since the target
//! last consumed. This is the sole readiness signal the scheduler
//! consults; it knows nothing about node semantics beyond the
//! `PersonJob` first-only and `Condition` single-branch exceptions
//! surfaced through [`TokenManager::produce`].

use std::collections::HashMap;

use crate::diagram::{EdgeRole, ExecutableDiagram, ExecutableNode, NodeKind};
use crate::ids::{EdgeId, NodeId};

#[derive(Default)]
pub struct TokenManager {
    counts: HashMap<EdgeId, u32>,
}

impl TokenManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// A node just produced an envelope on `output_key`; every outgoing
    /// edge reading that key gets one token. A `Condition` node only
    /// ever calls this for the single branch it fired on
    /// (spec §4.5 "Condition output").
    pub fn produce(&mut self, diagram: &ExecutableDiagram, source: &NodeId, output_key: &str) {
        for edge in diagram.outgoing_edges(source) {
            if edge.source_output_key == output_key {
                *self.counts.entry(edge.id.clone()).or_insert(0) += 1;
            }
        }
    }

    /// One token is consumed from each required incoming edge a node
    /// used this dispatch.
    pub fn consume(&mut self, edge_id: &EdgeId) {
        if let Some(count) = self.counts.get_mut(edge_id) {
            *count = count.saturating_sub(1);
        }
    }

    pub fn has_token(&self, edge_id: &EdgeId) -> bool {
        self.counts.get(edge_id).copied().unwrap_or(0) > 0
    }

    /// The readiness predicate (spec §4.5): zero incoming edges (entry
    /// nodes) are always ready; a `PersonJob` on its first execution is
    /// ready once any `first`-role edge has a token, independent of its
    /// default edges; otherwise every *distinct* `target_input_key` among
    /// its incoming edges needs at least one of its edges tokened.
    ///
    /// Grouping by `target_input_key` (rather than requiring every edge)
    /// is what lets a node fed by both branches of a `Condition` — e.g.
    /// an `End` joining `condtrue` and `condfalse` downstream paths, both
    /// wired to the same `default` input — become ready from whichever
    /// branch actually fired, without waiting forever on the edge whose
    /// source will never produce.
    pub fn is_ready(&self, diagram: &ExecutableDiagram, node: &ExecutableNode, execution_count: u32) -> bool {
        let mut incoming = diagram.incoming_edges(&node.id).peekable();
        if incoming.peek().is_none() {
            return true;
        }

        if execution_count == 0 && matches!(node.kind, NodeKind::PersonJob(_)) {
            let first_edges: Vec<_> = diagram.incoming_edges(&node.id).filter(|e| e.role == EdgeRole::First).collect();
            if !first_edges.is_empty() {
                return first_edges.iter().any(|e| self.has_token(&e.id));
            }
        }

        let mut by_key: HashMap<&str, Vec<&EdgeId>> = HashMap::new();
        for edge in diagram.incoming_edges(&node.id) {
            by_key.entry(edge.target_input_key.as_str()).or_default().push(&edge.id);
        }

        by_key.values().all(|edges| edges.iter().any(|id| self.has_token(id)))
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
    fn entry_node_with_no_incoming_edges_is_always_ready() {
        let diagram = compile(&DomainDiagram {
            nodes: vec![node("start", "Start", serde_json::json!({}))],
            arrows: vec![],
            metadata: DiagramMetadata::default(),
        })
        .unwrap();
        let manager = TokenManager::new();
        assert!(manager.is_ready(&diagram, &diagram.nodes()[0], 0));
    }

    #[test]
    fn first_only_edge_overrides_default_requirement() {
        let diagram = compile(&DomainDiagram {
            nodes: vec![
                node("start", "Start", serde_json::json!({})),
                node("other", "Start", serde_json::json!({})),
                node(
                    "p",
                    "PersonJob",
                    serde_json::json!({"person_id": "a", "default_prompt": "go", "max_iteration": 3}),
                ),
            ],
            arrows: vec![
                arrow("a1", "start:first:output", "p:first:input"),
                arrow("a2", "other:default:output", "p:default:input"),
            ],
            metadata: DiagramMetadata::default(),
        })
        .unwrap();
        let p = diagram.nodes().iter().find(|n| n.id.as_str() == "p").unwrap();
        let mut manager = TokenManager::new();
        manager.produce(&diagram, &NodeId::new("start"), "first");
        assert!(manager.is_ready(&diagram, p, 0));
    }

    #[test]
    fn node_joined_by_two_condition_branches_is_ready_from_either() {
        let diagram = compile(&DomainDiagram {
            nodes: vec![
                node("cond", "Condition", serde_json::json!({"condition_type": "expression", "expression": "true"})),
                node("a", "CodeJob", serde_json::json!({"language": "python", "code": "1"})),
                node("b", "CodeJob", serde_json::json!({"language": "python", "code": "1"})),
                node("end", "End", serde_json::json!({})),
            ],
            arrows: vec![
                arrow("e1", "cond:condtrue:output", "a:default:input"),
                arrow("e2", "cond:condfalse:output", "b:default:input"),
                arrow("e3", "a:default:output", "end:default:input"),
                arrow("e4", "b:default:output", "end:default:input"),
            ],
            metadata: DiagramMetadata::default(),
        })
        .unwrap();
        let end = diagram.nodes().iter().find(|n| n.id.as_str() == "end").unwrap();
        let mut manager = TokenManager::new();
        manager.produce(&diagram, &NodeId::new("a"), "default");
        assert!(manager.is_ready(&diagram, end, 0));
    }
}

//! Per-node input materialization (spec §4.8).

use std::collections::HashMap;

use serde_json::Value;

use crate::conversation::ConversationStore;
use crate::diagram::{ContentType, EdgeRole, ExecutableDiagram, ExecutableEdge, ExecutableNode, NodeKind};
use crate::envelope::{Envelope, Representation, RepresentationKind};
use crate::ids::NodeId;

/// The materialized `inputs` map a handler receives, keyed by the
/// target input name after label renaming (spec §4.8 step 3).
pub type Inputs = HashMap<String, Value>;

/// The incoming edges a node actually draws from this iteration: all
/// of them, except a `PersonJob`'s first iteration, which prefers
/// `first` edges and suppresses `default` ones entirely when any exist
/// (spec §4.8 step 4). Shared between input resolution and the
/// engine's token consumption so both agree on which edges were used.
pub fn relevant_incoming_edges<'a>(
    diagram: &'a ExecutableDiagram,
    node: &ExecutableNode,
    execution_count: u32,
) -> Vec<&'a ExecutableEdge> {
    let mut edges: Vec<_> = diagram.incoming_edges(&node.id).collect();
    if execution_count == 0 && matches!(node.kind, NodeKind::PersonJob(_)) {
        let has_first = edges.iter().any(|e| e.role == EdgeRole::First);
        if has_first {
            edges.retain(|e| e.role == EdgeRole::First);
        }
    }
    edges
}

pub struct InputResolver<'a> {
    diagram: &'a ExecutableDiagram,
}

impl<'a> InputResolver<'a> {
    pub fn new(diagram: &'a ExecutableDiagram) -> Self {
        Self { diagram }
    }

    /// Resolve `node`'s inputs from the outputs already recorded for its
    /// predecessors (spec §4.8 algorithm). `last_envelope` looks up the
    /// most recent output a source node produced; `conversations` backs
    /// the `conversation_state` fallback.
    pub fn resolve(
        &self,
        node: &ExecutableNode,
        execution_count: u32,
        last_envelope: impl Fn(&NodeId) -> Option<Envelope>,
        conversations: &ConversationStore,
        reader_person_id: Option<&str>,
    ) -> Inputs {
        let edges = relevant_incoming_edges(self.diagram, node, execution_count);

        let mut inputs = Inputs::new();
        for edge in edges {
            let Some(envelope) = last_envelope(&edge.source_node_id) else { continue };

            let value = match edge.transform_rules.content_type {
                ContentType::RawText => match envelope.representation(RepresentationKind::Text) {
                    Ok(Representation::Text(text)) => Value::String(text),
                    _ => Value::String(envelope.text()),
                },
                ContentType::Object => match envelope.representation(RepresentationKind::Object) {
                    Ok(Representation::Object(obj)) => obj,
                    _ => envelope.body.clone(),
                },
                ContentType::ConversationState => {
                    let owner = envelope.meta.person_id.clone();
                    match owner.as_deref() {
                        Some(owner) => {
                            let reader = reader_person_id.unwrap_or(owner);
                            let view = conversations.view(owner, reader);
                            serde_json::to_value(view).unwrap_or(Value::Null)
                        }
                        None => Value::Null,
                    }
                }
            };

            let key = edge.transform_rules.label.clone().unwrap_or_else(|| edge.target_input_key.clone());
            inputs.insert(key, value);
        }

        inputs
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
    fn raw_text_edge_resolves_to_body_text() {
        let diagram = compile(&DomainDiagram {
            nodes: vec![
                node("start", "Start", serde_json::json!({})),
                node("code", "CodeJob", serde_json::json!({"language": "python", "code": "1"})),
            ],
            arrows: vec![arrow("a1", "start:default:output", "code:x:input")],
            metadata: DiagramMetadata::default(),
        })
        .unwrap();
        let resolver = InputResolver::new(&diagram);
        let target = diagram.nodes().iter().find(|n| n.id.as_str() == "code").unwrap();
        let store = ConversationStore::new();
        let inputs = resolver.resolve(
            target,
            0,
            |id| (id.as_str() == "start").then(|| Envelope::new(serde_json::json!(21))),
            &store,
            None,
        );
        assert_eq!(inputs.get("x"), Some(&Value::String("21".to_string())));
    }
}

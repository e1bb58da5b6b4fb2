//! Diagram compilation: authored diagrams in, [`ExecutableDiagram`] out
//! (spec §4.1).

pub mod authored;
pub mod compiler;
pub mod edge;
pub mod node;

pub use authored::DomainDiagram;
pub use compiler::{compile, CompileWarning, ExecutableDiagram};
pub use edge::{ContentType, EdgeRole, ExecutableEdge, TransformRules};
pub use node::{ConditionStrategy, ExecutableNode, NodeKind};

use authored::{AuthoredArrow, AuthoredNode, DiagramMetadata};

/// Best-effort inverse of [`compile`]: reconstructs an authored diagram
/// whose node set, edge set, and handles recompile to an equivalent
/// executable form (spec §8 "Compile(decompile(executable)) preserves
/// node set, edge set, and handles modulo metadata-only fields").
pub fn decompile(diagram: &ExecutableDiagram) -> DomainDiagram {
    let nodes = diagram
        .nodes()
        .iter()
        .map(|n| AuthoredNode {
            id: n.id.as_str().to_string(),
            kind: n.kind.tag().to_string(),
            label: Some(n.label.clone()),
            data: node_kind_to_data(&n.kind),
        })
        .collect();

    let arrows = diagram
        .edges()
        .iter()
        .map(|e| AuthoredArrow {
            id: e.id.as_str().to_string(),
            source: format!("{}:{}:output", e.source_node_id, e.source_output_key),
            target: format!("{}:{}:input", e.target_node_id, e.target_input_key),
            content_type: Some(e.transform_rules.content_type),
            label: e.transform_rules.label.clone(),
        })
        .collect();

    DomainDiagram { nodes, arrows, metadata: DiagramMetadata { name: diagram.name.clone() } }
}

fn node_kind_to_data(kind: &NodeKind) -> serde_json::Value {
    let mut value = serde_json::to_value(kind).unwrap_or(serde_json::json!({}));
    if let Some(obj) = value.as_object_mut() {
        obj.remove("kind");
    }
    value
}

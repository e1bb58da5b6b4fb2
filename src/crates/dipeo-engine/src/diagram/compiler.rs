//! Diagram compilation (spec §4.1).
//!
//! `compile` is the only way to obtain an [`ExecutableDiagram`]; once
//! built it is immutable, and every field the runtime touches (nodes,
//! edges, the topological hint) has already been validated.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::ids::{EdgeId, NodeId, PersonId};

use super::authored::{DomainDiagram, Handle, HandleDirection};
use super::edge::{ContentType, EdgeRole, ExecutableEdge, TransformRules};
use super::node::{
    ApiJobParams, CodeJobParams, ConditionParams, ConditionStrategy, DbOperation, DbParams,
    ExecutableNode, HookKind, HookParams, IntegratedApiParams, JsonSchemaValidatorParams,
    MemorizeTo, NodeKind, PersonJobParams, SubDiagramParams, TemplateJobParams,
    TypescriptAstParams, UserResponseParams,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompileWarning {
    pub node_id: Option<String>,
    pub message: String,
}

/// An immutable, validated diagram ready for execution (spec §3
/// "Executable diagram").
#[derive(Debug, Clone)]
pub struct ExecutableDiagram {
    pub name: Option<String>,
    nodes: Vec<ExecutableNode>,
    edges: Vec<ExecutableEdge>,
    /// Index into `nodes`, keyed by `NodeId`, for O(1) lookup.
    node_index: HashMap<NodeId, usize>,
    /// Compile-time topological hint (spec §4.1 step 5). The scheduler
    /// does not rely on it strictly; it only breaks ties.
    pub topo_order: Vec<NodeId>,
    pub warnings: Vec<CompileWarning>,
}

impl ExecutableDiagram {
    pub fn nodes(&self) -> &[ExecutableNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[ExecutableEdge] {
        &self.edges
    }

    pub fn node(&self, id: &NodeId) -> Option<&ExecutableNode> {
        self.node_index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn incoming_edges(&self, target: &NodeId) -> impl Iterator<Item = &ExecutableEdge> {
        self.edges.iter().filter(move |e| &e.target_node_id == target)
    }

    pub fn outgoing_edges(&self, source: &NodeId) -> impl Iterator<Item = &ExecutableEdge> {
        self.edges.iter().filter(move |e| &e.source_node_id == source)
    }

    /// Index of `id` in the compile-time topological order, for the
    /// scheduler's tie-break rule (spec §4.6 step 4).
    pub fn topo_index(&self, id: &NodeId) -> usize {
        self.topo_order.iter().position(|n| n == id).unwrap_or(usize::MAX)
    }
}

/// Compile an authored diagram into its executable form (spec §4.1).
pub fn compile(domain_diagram: &DomainDiagram) -> Result<ExecutableDiagram> {
    let mut warnings = Vec::new();

    let known_ids: HashSet<&str> = domain_diagram.nodes.iter().map(|n| n.id.as_str()).collect();

    let mut nodes = Vec::with_capacity(domain_diagram.nodes.len());
    let mut node_index = HashMap::with_capacity(domain_diagram.nodes.len());
    for authored in &domain_diagram.nodes {
        let kind = build_node_kind(&authored.kind, &authored.data)
            .map_err(|e| EngineError::Compile(format!("node '{}': {e}", authored.id)))?;
        let label = authored.label.clone().unwrap_or_else(|| authored.id.clone());
        let node_id = NodeId::new(authored.id.clone());
        node_index.insert(node_id.clone(), nodes.len());
        nodes.push(ExecutableNode::new(node_id, label, kind));
    }

    let mut edges = Vec::with_capacity(domain_diagram.arrows.len());
    for arrow in &domain_diagram.arrows {
        let source = Handle::parse(&arrow.source)
            .ok_or_else(|| EngineError::Compile(format!("arrow '{}': malformed source handle", arrow.id)))?;
        let target = Handle::parse(&arrow.target)
            .ok_or_else(|| EngineError::Compile(format!("arrow '{}': malformed target handle", arrow.id)))?;

        if source.direction != HandleDirection::Output {
            return Err(EngineError::Compile(format!(
                "arrow '{}': source handle must be an output handle",
                arrow.id
            )));
        }
        if target.direction != HandleDirection::Input {
            return Err(EngineError::Compile(format!(
                "arrow '{}': target handle must be an input handle",
                arrow.id
            )));
        }
        if !known_ids.contains(source.node_id.as_str()) {
            return Err(EngineError::Compile(format!(
                "arrow '{}': unknown source node '{}'",
                arrow.id, source.node_id
            )));
        }
        if !known_ids.contains(target.node_id.as_str()) {
            return Err(EngineError::Compile(format!(
                "arrow '{}': unknown target node '{}'",
                arrow.id, target.node_id
            )));
        }

        let content_type = arrow.content_type.unwrap_or(ContentType::RawText);
        let mut transform_rules = TransformRules::new(content_type);
        if let Some(label) = &arrow.label {
            transform_rules = transform_rules.with_label(label.clone());
        }
        let role = if target.handle_label == "first" { EdgeRole::First } else { EdgeRole::Default };

        edges.push(ExecutableEdge {
            id: EdgeId::new(arrow.id.clone()),
            source_node_id: NodeId::new(source.node_id),
            source_output_key: source.handle_label,
            target_node_id: NodeId::new(target.node_id),
            target_input_key: target.handle_label,
            transform_rules,
            role,
        });
    }

    let topo_order = topological_hint(&nodes, &edges, &mut warnings);

    Ok(ExecutableDiagram {
        name: domain_diagram.metadata.name.clone(),
        nodes,
        edges,
        node_index,
        topo_order,
        warnings,
    })
}

/// Kahn's algorithm tolerating back-edges: cycles are legal (spec §4.1
/// step 5, §9 "Cyclic graphs"). Nodes left over once no more
/// zero-in-degree nodes remain are a cyclic component; they're ordered
/// by `cycle_priority` (Start, then PersonJob, then others) and
/// appended in discovery order, breaking the algorithm's stall instead
/// of rejecting the diagram.
fn topological_hint(
    nodes: &[ExecutableNode],
    edges: &[ExecutableEdge],
    warnings: &mut Vec<CompileWarning>,
) -> Vec<NodeId> {
    let mut in_degree: HashMap<&NodeId, usize> = nodes.iter().map(|n| (&n.id, 0)).collect();
    for edge in edges {
        if let Some(count) = in_degree.get_mut(&edge.target_node_id) {
            *count += 1;
        }
    }

    let discovery_index: HashMap<&NodeId, usize> =
        nodes.iter().enumerate().map(|(i, n)| (&n.id, i)).collect();

    let mut remaining: HashSet<NodeId> = nodes.iter().map(|n| n.id.clone()).collect();
    let mut order = Vec::with_capacity(nodes.len());

    loop {
        let mut ready: Vec<&NodeId> = remaining
            .iter()
            .filter(|id| in_degree.get(id).copied().unwrap_or(0) == 0)
            .collect();

        if ready.is_empty() {
            break;
        }

        ready.sort_by_key(|id| discovery_index.get(id).copied().unwrap_or(usize::MAX));

        for id in ready {
            let id = id.clone();
            order.push(id.clone());
            remaining.remove(&id);
            for edge in edges.iter().filter(|e| e.source_node_id == id) {
                if let Some(count) = in_degree.get_mut(&edge.target_node_id) {
                    *count = count.saturating_sub(1);
                }
            }
        }
    }

    if !remaining.is_empty() {
        warnings.push(CompileWarning {
            node_id: None,
            message: format!("{} node(s) participate in a cycle; ordered by priority", remaining.len()),
        });

        let node_by_id: HashMap<&NodeId, &ExecutableNode> = nodes.iter().map(|n| (&n.id, n)).collect();
        let mut cyclic: Vec<&NodeId> = remaining.iter().collect();
        cyclic.sort_by_key(|id| {
            let priority = node_by_id.get(id).map(|n| n.kind.cycle_priority()).unwrap_or(2);
            let discovery = discovery_index.get(id).copied().unwrap_or(usize::MAX);
            (priority, discovery)
        });
        order.extend(cyclic.into_iter().cloned());
    }

    order
}

fn require_str(data: &serde_json::Value, field: &str) -> std::result::Result<String, String> {
    data.get(field)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| format!("missing required field '{field}'"))
}

fn build_node_kind(kind: &str, data: &serde_json::Value) -> std::result::Result<NodeKind, String> {
    match kind {
        "Start" => Ok(NodeKind::Start),
        "End" => Ok(NodeKind::End(super::node::EndParams {
            output_path: data.get("output_path").and_then(|v| v.as_str()).map(String::from),
        })),
        "PersonJob" => {
            let max_iteration = data.get("max_iteration").and_then(|v| v.as_u64()).unwrap_or(1) as u32;
            if max_iteration < 1 {
                return Err("PersonJob.max_iteration must be >= 1".into());
            }
            Ok(NodeKind::PersonJob(PersonJobParams {
                person_id: PersonId::new(require_str(data, "person_id")?),
                default_prompt: require_str(data, "default_prompt")?,
                first_only_prompt: data.get("first_only_prompt").and_then(|v| v.as_str()).map(String::from),
                max_iteration,
                memorize_to: data
                    .get("memorize_to")
                    .map(|v| serde_json::from_value::<MemorizeTo>(v.clone()))
                    .transpose()
                    .map_err(|e| format!("invalid memorize_to: {e}"))?,
                text_format: data.get("text_format").cloned(),
                tools: data
                    .get("tools")
                    .and_then(|v| v.as_array())
                    .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
                    .unwrap_or_default(),
            }))
        }
        "CodeJob" => Ok(NodeKind::CodeJob(CodeJobParams {
            language: require_str(data, "language")?,
            code: require_str(data, "code")?,
        })),
        "ApiJob" => Ok(NodeKind::ApiJob(ApiJobParams {
            url: require_str(data, "url")?,
            method: data.get("method").and_then(|v| v.as_str()).unwrap_or("GET").to_string(),
            headers: data.get("headers").cloned().unwrap_or(serde_json::json!({})),
            body: data.get("body").cloned(),
            timeout_seconds: data.get("timeout_seconds").and_then(|v| v.as_u64()),
        })),
        "Condition" => {
            let condition_type = require_str(data, "condition_type")?;
            let strategy = match condition_type.as_str() {
                "expression" => ConditionStrategy::Expression { expression: require_str(data, "expression")? },
                "llm_decision" => ConditionStrategy::LlmDecision {
                    person_id: PersonId::new(require_str(data, "person_id")?),
                    prompt: require_str(data, "prompt")?,
                },
                "detect_max_iterations" => ConditionStrategy::DetectMaxIterations {
                    target_node_id: NodeId::new(require_str(data, "target_node_id")?),
                },
                other => return Err(format!("unknown condition_type '{other}'")),
            };
            Ok(NodeKind::Condition(ConditionParams { strategy }))
        }
        "Db" => {
            let operation = match require_str(data, "operation")?.as_str() {
                "read" => DbOperation::Read,
                "write" => DbOperation::Write,
                "append" => DbOperation::Append,
                other => return Err(format!("unknown Db operation '{other}'")),
            };
            Ok(NodeKind::Db(DbParams {
                operation,
                file: require_str(data, "file")?,
                serialize_json: data.get("serialize_json").and_then(|v| v.as_bool()).unwrap_or(false),
            }))
        }
        "TemplateJob" => Ok(NodeKind::TemplateJob(TemplateJobParams {
            template: require_str(data, "template")?,
            output_path: data.get("output_path").and_then(|v| v.as_str()).map(String::from),
        })),
        "SubDiagram" => Ok(NodeKind::SubDiagram(SubDiagramParams {
            diagram_name: require_str(data, "diagram_name")?,
            batch: data.get("batch").and_then(|v| v.as_bool()).unwrap_or(false),
            batch_parallel: data.get("batch_parallel").and_then(|v| v.as_bool()).unwrap_or(false),
        })),
        "UserResponse" => Ok(NodeKind::UserResponse(UserResponseParams {
            prompt_text: require_str(data, "prompt_text")?,
            timeout_seconds: data.get("timeout_seconds").and_then(|v| v.as_u64()),
        })),
        "Hook" => {
            let hook_kind = match require_str(data, "hook_kind")?.as_str() {
                "shell" => HookKind::Shell,
                "webhook" => HookKind::Webhook,
                "python" => HookKind::Python,
                other => return Err(format!("unknown hook kind '{other}'")),
            };
            Ok(NodeKind::Hook(HookParams { kind: hook_kind, command: require_str(data, "command")? }))
        }
        "JsonSchemaValidator" => Ok(NodeKind::JsonSchemaValidator(JsonSchemaValidatorParams {
            schema: data.get("schema").cloned().ok_or_else(|| "missing required field 'schema'".to_string())?,
            strict: data.get("strict").and_then(|v| v.as_bool()).unwrap_or(false),
        })),
        "TypescriptAst" => {
            Ok(NodeKind::TypescriptAst(TypescriptAstParams { source: require_str(data, "source")? }))
        }
        "IntegratedApi" => Ok(NodeKind::IntegratedApi(IntegratedApiParams {
            provider: require_str(data, "provider")?,
            operation: require_str(data, "operation")?,
            config: data.get("config").cloned().unwrap_or(serde_json::json!({})),
        })),
        other => Err(format!("unknown node kind '{other}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagram::authored::{AuthoredArrow, AuthoredNode, DiagramMetadata};

    fn node(id: &str, kind: &str, data: serde_json::Value) -> AuthoredNode {
        AuthoredNode { id: id.to_string(), kind: kind.to_string(), label: None, data }
    }

    fn arrow(id: &str, source: &str, target: &str) -> AuthoredArrow {
        AuthoredArrow { id: id.to_string(), source: source.to_string(), target: target.to_string(), content_type: None, label: None }
    }

    #[test]
    fn compiles_linear_start_codejob_end() {
        let diagram = DomainDiagram {
            nodes: vec![
                node("start", "Start", serde_json::json!({})),
                node("code", "CodeJob", serde_json::json!({"language": "python", "code": "x*2"})),
                node("end", "End", serde_json::json!({})),
            ],
            arrows: vec![
                arrow("a1", "start:default:output", "code:default:input"),
                arrow("a2", "code:default:output", "end:default:input"),
            ],
            metadata: DiagramMetadata::default(),
        };
        let compiled = compile(&diagram).unwrap();
        assert_eq!(compiled.nodes().len(), 3);
        assert_eq!(compiled.edges().len(), 2);
        assert_eq!(compiled.topo_order[0], NodeId::new("start"));
    }

    #[test]
    fn rejects_arrow_to_unknown_node() {
        let diagram = DomainDiagram {
            nodes: vec![node("start", "Start", serde_json::json!({}))],
            arrows: vec![arrow("a1", "start:default:output", "ghost:default:input")],
            metadata: DiagramMetadata::default(),
        };
        assert!(compile(&diagram).is_err());
    }

    #[test]
    fn rejects_person_job_with_zero_max_iteration() {
        let diagram = DomainDiagram {
            nodes: vec![node(
                "p",
                "PersonJob",
                serde_json::json!({"person_id": "analyst", "default_prompt": "go", "max_iteration": 0}),
            )],
            arrows: vec![],
            metadata: DiagramMetadata::default(),
        };
        assert!(compile(&diagram).is_err());
    }

    #[test]
    fn tolerates_cycles_and_orders_by_priority() {
        let diagram = DomainDiagram {
            nodes: vec![
                node("start", "Start", serde_json::json!({})),
                node(
                    "p",
                    "PersonJob",
                    serde_json::json!({"person_id": "a", "default_prompt": "go", "max_iteration": 3}),
                ),
                node(
                    "c",
                    "Condition",
                    serde_json::json!({"condition_type": "expression", "expression": "true"}),
                ),
            ],
            arrows: vec![
                arrow("a1", "start:default:output", "p:default:input"),
                arrow("a2", "p:default:output", "c:default:input"),
                arrow("a3", "c:condtrue:output", "p:default:input"),
            ],
            metadata: DiagramMetadata::default(),
        };
        let compiled = compile(&diagram).unwrap();
        assert_eq!(compiled.nodes().len(), 3);
        assert!(!compiled.warnings.is_empty());
    }
}

//! `SubDiagram` handler (spec §4.7): runs another diagram to terminal
//! state as part of the parent execution, with a fresh `execution_id`
//! and `parent_execution_id` set so the child's events and state are
//! siblings of the parent's (spec §3 "Sub-diagram executions are
//! siblings linked by `parent_execution_id`").

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::diagram::{compile, ExecutableNode, NodeKind};
use crate::engine::ExecutionEngine;
use crate::envelope::Envelope;
use crate::error::{EngineError, Result};
use crate::handler::HandlerRegistry;
use crate::ids::ExecutionId;
use crate::ports::DiagramRepositoryPort;
use crate::resolver::Inputs;
use crate::runtime::ExecutionContext;
use crate::state::ExecutionStatus;

use super::Handler;

pub struct SubDiagramHandler;

/// Input key a batch-mode `SubDiagram` reads its per-iteration array
/// from. Everything else in `inputs` is passed through unchanged as
/// the child's variables on every iteration.
const BATCH_INPUT_KEY: &str = "items";

#[async_trait]
impl Handler for SubDiagramHandler {
    fn required_services(&self) -> &'static [&'static str] {
        &["diagram_repository"]
    }

    async fn execute(&self, node: &ExecutableNode, inputs: Inputs, context: &ExecutionContext) -> Result<Envelope> {
        let NodeKind::SubDiagram(params) = &node.kind else {
            return Err(EngineError::HandlerValidation {
                node_id: node.id.to_string(),
                message: "SubDiagramHandler received a non-SubDiagram node".into(),
            });
        };

        let repository = context.services.require::<Arc<dyn DiagramRepositoryPort>>("SubDiagram", "diagram_repository")?;
        let domain_diagram = repository.load(&params.diagram_name).await?;
        let diagram = Arc::new(compile(&domain_diagram).map_err(|e| EngineError::HandlerValidation {
            node_id: node.id.to_string(),
            message: format!("sub-diagram '{}' failed to compile: {e}", params.diagram_name),
        })?);

        if params.batch {
            let Some(Value::Array(items)) = inputs.get(BATCH_INPUT_KEY) else {
                return Err(EngineError::HandlerValidation {
                    node_id: node.id.to_string(),
                    message: format!("batch SubDiagram requires an array input named '{BATCH_INPUT_KEY}'"),
                });
            };

            let runs = items.iter().map(|item| self.run_once(node, &inputs, item.clone(), &diagram, context));

            let results = if params.batch_parallel {
                futures::future::try_join_all(runs).await?
            } else {
                let mut results = Vec::with_capacity(items.len());
                for run in runs {
                    results.push(run.await?);
                }
                results
            };

            return Ok(Envelope::new(Value::Array(results)));
        }

        let variables = Value::Object(inputs.iter().map(|(k, v)| (k.clone(), v.clone())).collect());
        let output = self.run_once(node, &inputs, variables, &diagram, context).await?;
        Ok(Envelope::new(output))
    }
}

impl SubDiagramHandler {
    /// Run the child diagram once with `variables` as its input, either
    /// the whole resolved `inputs` map (non-batch) or one batch element
    /// merged over it (batch), returning the child's last node output.
    async fn run_once(
        &self,
        node: &ExecutableNode,
        inputs: &Inputs,
        variables: Value,
        diagram: &Arc<crate::diagram::ExecutableDiagram>,
        context: &ExecutionContext,
    ) -> Result<Value> {
        let mut merged = inputs.clone();
        if let Value::Object(ref map) = variables {
            for (k, v) in map {
                merged.insert(k.clone(), v.clone());
            }
        }
        let child_variables = Value::Object(merged.into_iter().collect());

        let mut options = (*context.options).clone();
        options.variables = child_variables;
        let child_context = context.child_context(ExecutionId::generate(), Arc::clone(diagram), Arc::new(options));

        let engine = ExecutionEngine::new(Arc::new(HandlerRegistry::with_builtin_handlers()));
        let outcome = engine.run(&child_context).await?;

        if outcome.status != ExecutionStatus::Completed {
            return Err(EngineError::HandlerValidation {
                node_id: node.id.to_string(),
                message: format!(
                    "sub-diagram '{}' child execution {} ended in {:?}: {}",
                    child_context.diagram.name.as_deref().unwrap_or("unnamed"),
                    child_context.execution_id,
                    outcome.status,
                    outcome.error.as_deref().unwrap_or("no error recorded")
                ),
            });
        }

        let end_node = diagram.nodes().iter().rev().find(|n| matches!(n.kind, NodeKind::End(_)));
        let last_id = end_node.map(|n| n.id.clone()).or_else(|| diagram.nodes().last().map(|n| n.id.clone()));
        let body = last_id.and_then(|id| outcome.outputs.get(&id)).map(|envelope| envelope.body.clone()).unwrap_or(Value::Null);

        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_input_key_is_stable() {
        assert_eq!(BATCH_INPUT_KEY, "items");
    }
}

//! `JsonSchemaValidator` handler (spec §4.9): validates the node's
//! single input against a JSON Schema; fails or passes through per
//! `strict`.

use async_trait::async_trait;
use serde_json::Value;

use crate::diagram::{ExecutableNode, NodeKind};
use crate::envelope::Envelope;
use crate::error::{EngineError, Result};
use crate::resolver::Inputs;
use crate::runtime::ExecutionContext;

use super::Handler;

pub struct JsonSchemaValidatorHandler;

#[async_trait]
impl Handler for JsonSchemaValidatorHandler {
    async fn execute(&self, node: &ExecutableNode, inputs: Inputs, _context: &ExecutionContext) -> Result<Envelope> {
        let NodeKind::JsonSchemaValidator(params) = &node.kind else {
            return Err(EngineError::HandlerValidation {
                node_id: node.id.to_string(),
                message: "JsonSchemaValidatorHandler received a non-JsonSchemaValidator node".into(),
            });
        };

        let subject = inputs.values().next().cloned().unwrap_or(Value::Null);

        let compiled = jsonschema::JSONSchema::compile(&params.schema).map_err(|e| EngineError::HandlerValidation {
            node_id: node.id.to_string(),
            message: format!("invalid schema: {e}"),
        })?;

        let errors: Vec<String> = compiled
            .validate(&subject)
            .err()
            .map(|iter| iter.map(|e| e.to_string()).collect())
            .unwrap_or_default();

        if !errors.is_empty() && params.strict {
            return Err(EngineError::HandlerValidation {
                node_id: node.id.to_string(),
                message: format!("schema validation failed: {}", errors.join("; ")),
            });
        }

        Ok(Envelope::new(serde_json::json!({
            "valid": errors.is_empty(),
            "errors": errors,
            "value": subject,
        })))
    }
}

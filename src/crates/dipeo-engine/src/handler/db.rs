//! `Db` handler (spec §4.9): reads or writes files through the file
//! service port, with optional JSON (de)serialization.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::diagram::node::DbOperation;
use crate::diagram::{ExecutableNode, NodeKind};
use crate::envelope::Envelope;
use crate::error::{EngineError, Result};
use crate::ports::FileServicePort;
use crate::resolver::Inputs;
use crate::runtime::ExecutionContext;

use super::Handler;

pub struct DbHandler;

#[async_trait]
impl Handler for DbHandler {
    fn required_services(&self) -> &'static [&'static str] {
        &["file"]
    }

    async fn execute(&self, node: &ExecutableNode, inputs: Inputs, context: &ExecutionContext) -> Result<Envelope> {
        let NodeKind::Db(params) = &node.kind else {
            return Err(EngineError::HandlerValidation {
                node_id: node.id.to_string(),
                message: "DbHandler received a non-Db node".into(),
            });
        };

        let file = context.services.require::<Arc<dyn FileServicePort>>("Db", "file")?;

        let body = match params.operation {
            DbOperation::Read => {
                let content = file.read(&params.file).await?;
                if params.serialize_json {
                    serde_json::from_str::<Value>(&content)?
                } else {
                    Value::String(content)
                }
            }
            DbOperation::Write => {
                let content = render_content(&inputs, params.serialize_json)?;
                file.write(&params.file, &content).await?;
                Value::String(content)
            }
            DbOperation::Append => {
                let existing = file.read(&params.file).await.unwrap_or_default();
                let addition = render_content(&inputs, params.serialize_json)?;
                let content = format!("{existing}{addition}");
                file.write(&params.file, &content).await?;
                Value::String(addition)
            }
        };

        Ok(Envelope::new(body))
    }
}

fn render_content(inputs: &Inputs, serialize_json: bool) -> Result<String> {
    if serialize_json {
        let object: serde_json::Map<String, Value> = inputs.clone().into_iter().collect();
        return Ok(serde_json::to_string_pretty(&Value::Object(object))?);
    }
    Ok(inputs
        .values()
        .next()
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_default())
}

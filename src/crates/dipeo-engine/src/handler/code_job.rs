//! `CodeJob` handler (spec §4.9): delegates to a sandbox collaborator.

use std::sync::Arc;

use async_trait::async_trait;

use crate::diagram::{ExecutableNode, NodeKind};
use crate::envelope::Envelope;
use crate::error::{EngineError, Result};
use crate::ports::SandboxPort;
use crate::resolver::Inputs;
use crate::runtime::ExecutionContext;

use super::Handler;

pub struct CodeJobHandler;

#[async_trait]
impl Handler for CodeJobHandler {
    fn required_services(&self) -> &'static [&'static str] {
        &["sandbox"]
    }

    async fn execute(&self, node: &ExecutableNode, inputs: Inputs, context: &ExecutionContext) -> Result<Envelope> {
        let NodeKind::CodeJob(params) = &node.kind else {
            return Err(EngineError::HandlerValidation {
                node_id: node.id.to_string(),
                message: "CodeJobHandler received a non-CodeJob node".into(),
            });
        };

        let sandbox = context.services.require::<Arc<dyn SandboxPort>>("CodeJob", "sandbox")?;
        let inputs_value = serde_json::Value::Object(inputs.into_iter().collect());
        let result = sandbox.execute(&params.language, &params.code, &inputs_value).await?;

        let body = result.return_value.unwrap_or_else(|| serde_json::Value::String(result.stdout));
        Ok(Envelope::new(body))
    }
}

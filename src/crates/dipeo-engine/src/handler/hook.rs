//! `Hook` handler (spec §4.9): runs a shell, webhook, or python hook.
//! Shell and python hooks delegate to the sandbox port; webhook hooks
//! delegate to the HTTP port, matching `CodeJob`/`ApiJob`'s collaborators
//! rather than inventing a dedicated transport.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::diagram::node::HookKind;
use crate::diagram::{ExecutableNode, NodeKind};
use crate::envelope::Envelope;
use crate::error::{EngineError, Result};
use crate::ports::{HttpRequest, HttpServicePort, SandboxPort};
use crate::resolver::Inputs;
use crate::runtime::ExecutionContext;

use super::Handler;

pub struct HookHandler;

#[async_trait]
impl Handler for HookHandler {
    async fn execute(&self, node: &ExecutableNode, inputs: Inputs, context: &ExecutionContext) -> Result<Envelope> {
        let NodeKind::Hook(params) = &node.kind else {
            return Err(EngineError::HandlerValidation {
                node_id: node.id.to_string(),
                message: "HookHandler received a non-Hook node".into(),
            });
        };

        let body = match params.kind {
            HookKind::Shell => {
                let sandbox = context.services.require::<Arc<dyn SandboxPort>>("Hook", "sandbox")?;
                let inputs_value = Value::Object(inputs.into_iter().collect());
                let result = sandbox.execute("bash", &params.command, &inputs_value).await?;
                result.return_value.unwrap_or(Value::String(result.stdout))
            }
            HookKind::Python => {
                let sandbox = context.services.require::<Arc<dyn SandboxPort>>("Hook", "sandbox")?;
                let inputs_value = Value::Object(inputs.into_iter().collect());
                let result = sandbox.execute("python", &params.command, &inputs_value).await?;
                result.return_value.unwrap_or(Value::String(result.stdout))
            }
            HookKind::Webhook => {
                let http = context.services.require::<Arc<dyn HttpServicePort>>("Hook", "http")?;
                let body = Value::Object(inputs.into_iter().collect());
                let response = http
                    .request(HttpRequest {
                        method: "POST".to_string(),
                        url: params.command.clone(),
                        headers: Value::Object(Default::default()),
                        body: Some(body),
                        timeout_seconds: None,
                    })
                    .await?;
                response.body
            }
        };

        Ok(Envelope::new(body))
    }
}

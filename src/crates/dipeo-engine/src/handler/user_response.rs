//! `UserResponse` handler (spec §4.9): prompts through the interactive
//! handler port and times out per node config.

use std::sync::Arc;

use async_trait::async_trait;

use crate::diagram::{ExecutableNode, NodeKind};
use crate::envelope::Envelope;
use crate::error::{EngineError, Result};
use crate::ports::InteractiveHandlerPort;
use crate::resolver::Inputs;
use crate::runtime::ExecutionContext;

use super::Handler;

pub struct UserResponseHandler;

#[async_trait]
impl Handler for UserResponseHandler {
    fn required_services(&self) -> &'static [&'static str] {
        &["interactive"]
    }

    async fn execute(&self, node: &ExecutableNode, _inputs: Inputs, context: &ExecutionContext) -> Result<Envelope> {
        let NodeKind::UserResponse(params) = &node.kind else {
            return Err(EngineError::HandlerValidation {
                node_id: node.id.to_string(),
                message: "UserResponseHandler received a non-UserResponse node".into(),
            });
        };

        let interactive = context.services.require::<Arc<dyn InteractiveHandlerPort>>("UserResponse", "interactive")?;
        let response = interactive
            .prompt(node.id.as_str(), &params.prompt_text, params.timeout_seconds)
            .await?;

        match response {
            Some(text) => Ok(Envelope::new(serde_json::Value::String(text))),
            None => Err(EngineError::Timeout {
                scope: format!("UserResponse node '{}'", node.id),
                elapsed_ms: params.timeout_seconds.unwrap_or(0) * 1000,
            }),
        }
    }
}

//! `End` handler (spec §4.9): "Collects inputs, optionally writes to
//! file via FileServicePort. Body is the collected input (single value
//! if one input, else list)."

use std::sync::Arc;

use async_trait::async_trait;

use crate::diagram::ExecutableNode;
use crate::envelope::Envelope;
use crate::error::Result;
use crate::ports::FileServicePort;
use crate::resolver::Inputs;
use crate::runtime::ExecutionContext;

use super::Handler;

pub struct EndHandler;

#[async_trait]
impl Handler for EndHandler {
    async fn execute(&self, node: &ExecutableNode, inputs: Inputs, context: &ExecutionContext) -> Result<Envelope> {
        let mut values: Vec<_> = inputs.into_values().collect();
        let body = if values.len() == 1 {
            values.remove(0)
        } else {
            serde_json::Value::Array(values)
        };

        if let crate::diagram::NodeKind::End(params) = &node.kind {
            if let Some(path) = &params.output_path {
                if let Some(file_service) = context.services.get::<Arc<dyn FileServicePort>>() {
                    file_service.write(path, &body.to_string()).await?;
                }
            }
        }

        Ok(Envelope::new(body))
    }
}

//! `IntegratedApi` handler (spec §4.9): provider-specific operations
//! (Notion/Slack/GitHub, ...). The execution core has no concrete
//! provider clients; it dispatches through the generic HTTP port with
//! the provider/operation encoded in the request, the same seam
//! `ApiJob` uses, and leaves provider-shaped request building to the
//! adapter behind [`HttpServicePort`].

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::diagram::{ExecutableNode, NodeKind};
use crate::envelope::Envelope;
use crate::error::{EngineError, Result};
use crate::ports::{HttpRequest, HttpServicePort};
use crate::resolver::Inputs;
use crate::runtime::ExecutionContext;

use super::Handler;

pub struct IntegratedApiHandler;

#[async_trait]
impl Handler for IntegratedApiHandler {
    fn required_services(&self) -> &'static [&'static str] {
        &["http"]
    }

    async fn execute(&self, node: &ExecutableNode, inputs: Inputs, context: &ExecutionContext) -> Result<Envelope> {
        let NodeKind::IntegratedApi(params) = &node.kind else {
            return Err(EngineError::HandlerValidation {
                node_id: node.id.to_string(),
                message: "IntegratedApiHandler received a non-IntegratedApi node".into(),
            });
        };

        let http = context.services.require::<Arc<dyn HttpServicePort>>("IntegratedApi", "http")?;
        let body = json!({
            "provider": params.provider,
            "operation": params.operation,
            "config": params.config,
            "inputs": inputs,
        });

        let response = http
            .request(HttpRequest {
                method: "POST".to_string(),
                url: format!("integrated://{}/{}", params.provider, params.operation),
                headers: json!({}),
                body: Some(body),
                timeout_seconds: None,
            })
            .await?;

        Ok(Envelope::new(response.body))
    }
}

//! `ApiJob` handler (spec §4.9): HTTP request via the HTTP port, with
//! URL/headers/body interpolated from inputs.

use std::sync::Arc;

use async_trait::async_trait;

use crate::diagram::{ExecutableNode, NodeKind};
use crate::envelope::Envelope;
use crate::error::{EngineError, Result};
use crate::ports::{HttpRequest, HttpServicePort};
use crate::resolver::Inputs;
use crate::runtime::ExecutionContext;

use super::Handler;

pub struct ApiJobHandler;

/// Replace `{{key}}` placeholders with the stringified input value.
fn interpolate(template: &str, inputs: &Inputs) -> String {
    let mut rendered = template.to_string();
    for (key, value) in inputs {
        let placeholder = format!("{{{{{key}}}}}");
        let replacement = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        rendered = rendered.replace(&placeholder, &replacement);
    }
    rendered
}

#[async_trait]
impl Handler for ApiJobHandler {
    fn required_services(&self) -> &'static [&'static str] {
        &["http"]
    }

    async fn execute(&self, node: &ExecutableNode, inputs: Inputs, context: &ExecutionContext) -> Result<Envelope> {
        let NodeKind::ApiJob(params) = &node.kind else {
            return Err(EngineError::HandlerValidation {
                node_id: node.id.to_string(),
                message: "ApiJobHandler received a non-ApiJob node".into(),
            });
        };

        let http = context.services.require::<Arc<dyn HttpServicePort>>("ApiJob", "http")?;
        let url = interpolate(&params.url, &inputs);

        let response = http
            .request(HttpRequest {
                method: params.method.clone(),
                url,
                headers: params.headers.clone(),
                body: params.body.clone(),
                timeout_seconds: params.timeout_seconds,
            })
            .await?;

        Ok(Envelope::new(response.body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolate_substitutes_named_placeholders() {
        let mut inputs = Inputs::new();
        inputs.insert("id".to_string(), serde_json::json!(42));
        assert_eq!(interpolate("/users/{{id}}", &inputs), "/users/42");
    }
}

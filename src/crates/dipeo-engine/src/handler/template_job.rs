//! `TemplateJob` handler (spec §4.9): Jinja2-style `{{var}}`
//! substitution against `inputs`, written to `output_path` or returned
//! directly.

use std::sync::Arc;

use async_trait::async_trait;

use crate::diagram::{ExecutableNode, NodeKind};
use crate::envelope::Envelope;
use crate::error::{EngineError, Result};
use crate::ports::FileServicePort;
use crate::resolver::Inputs;
use crate::runtime::ExecutionContext;

use super::Handler;

pub struct TemplateJobHandler;

fn render(template: &str, inputs: &Inputs) -> String {
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
impl Handler for TemplateJobHandler {
    async fn execute(&self, node: &ExecutableNode, inputs: Inputs, context: &ExecutionContext) -> Result<Envelope> {
        let NodeKind::TemplateJob(params) = &node.kind else {
            return Err(EngineError::HandlerValidation {
                node_id: node.id.to_string(),
                message: "TemplateJobHandler received a non-TemplateJob node".into(),
            });
        };

        let rendered = render(&params.template, &inputs);

        if let Some(path) = &params.output_path {
            let file = context.services.require::<Arc<dyn FileServicePort>>("TemplateJob", "file")?;
            file.write(path, &rendered).await?;
        }

        Ok(Envelope::new(serde_json::Value::String(rendered)))
    }
}

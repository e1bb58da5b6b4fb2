//! `Condition` handler (spec §4.9): evaluates one of three strategies
//! and emits on exactly one of `condtrue`/`condfalse`.

use std::sync::Arc;

use async_trait::async_trait;
use evalexpr::{ContextWithMutableVariables, HashMapContext, Value as EvalValue};

use crate::diagram::{ConditionStrategy, ExecutableNode, NodeKind};
use crate::envelope::Envelope;
use crate::error::{EngineError, Result};
use crate::ports::{CompletionRequest, LlmServicePort};
use crate::resolver::Inputs;
use crate::runtime::ExecutionContext;

use super::Handler;

pub struct ConditionHandler;

/// The output key a `Condition` produced on, per spec §4.5 "Condition
/// output" — only this branch's edges receive tokens.
pub const OUTPUT_TRUE: &str = "condtrue";
pub const OUTPUT_FALSE: &str = "condfalse";

fn eval_context(inputs: &Inputs) -> HashMapContext {
    let mut ctx = HashMapContext::new();
    for (key, value) in inputs {
        let eval_value = match value {
            serde_json::Value::Number(n) if n.is_i64() => EvalValue::Int(n.as_i64().unwrap()),
            serde_json::Value::Number(n) => EvalValue::Float(n.as_f64().unwrap_or_default()),
            serde_json::Value::Bool(b) => EvalValue::Boolean(*b),
            serde_json::Value::String(s) => EvalValue::String(s.clone()),
            other => EvalValue::String(other.to_string()),
        };
        let _ = ctx.set_value(key.clone(), eval_value);
    }
    ctx
}

#[async_trait]
impl Handler for ConditionHandler {
    async fn execute(&self, node: &ExecutableNode, inputs: Inputs, context: &ExecutionContext) -> Result<Envelope> {
        let NodeKind::Condition(params) = &node.kind else {
            return Err(EngineError::HandlerValidation {
                node_id: node.id.to_string(),
                message: "ConditionHandler received a non-Condition node".into(),
            });
        };

        let decision = match &params.strategy {
            ConditionStrategy::Expression { expression } => {
                let ctx = eval_context(&inputs);
                evalexpr::eval_boolean_with_context(expression, &ctx)
                    .map_err(|e| EngineError::HandlerValidation {
                        node_id: node.id.to_string(),
                        message: format!("expression evaluation failed: {e}"),
                    })?
            }
            ConditionStrategy::LlmDecision { person_id, prompt } => {
                let llm = context.services.require::<Arc<dyn LlmServicePort>>("Condition", "llm")?;
                let response = llm
                    .complete(CompletionRequest {
                        messages: vec![crate::conversation::ViewedMessage {
                            role: crate::conversation::Role::User,
                            content: prompt.clone(),
                            person_id: Some(person_id.to_string()),
                        }],
                        model: "default".to_string(),
                        api_key_id: String::new(),
                        tools: Vec::new(),
                        text_format: None,
                    })
                    .await?;
                response.text.trim().to_lowercase().starts_with('y')
            }
            ConditionStrategy::DetectMaxIterations { target_node_id } => context
                .state
                .get_node_state(&context.execution_id, target_node_id)
                .and_then(|state| state.status)
                .map(|status| status == crate::state::ExecutionStatus::MaxiterReached)
                .unwrap_or(false),
        };

        let output_key = if decision { OUTPUT_TRUE } else { OUTPUT_FALSE };
        Ok(Envelope::new(serde_json::Value::Bool(decision)).with_output_key(output_key))
    }
}

//! `PersonJob` handler (spec §4.9): the LLM-calling node. Builds a
//! prompt, applies memory selection over the person's conversation,
//! calls the LLM port, appends the reply, and returns `text`/`object`/
//! `conversation` representations off the one production.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::conversation::{Message, Role, ViewedMessage};
use crate::diagram::{ExecutableNode, NodeKind};
use crate::envelope::{Envelope, EnvelopeMeta, RepresentationKind};
use crate::error::{EngineError, Result};
use crate::ports::{CompletionRequest, LlmServicePort, MemorySelector, SubstringMemorySelector};
use crate::resolver::Inputs;
use crate::runtime::ExecutionContext;

use super::Handler;

pub struct PersonJobHandler;

/// Replace `{{key}}` placeholders in a prompt template with the
/// stringified input value (spec §4.9 "with `{{var}}` interpolation
/// from `inputs`").
fn interpolate(template: &str, inputs: &Inputs) -> String {
    let mut rendered = template.to_string();
    for (key, value) in inputs {
        let placeholder = format!("{{{{{key}}}}}");
        let replacement = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        rendered = rendered.replace(&placeholder, &replacement);
    }
    rendered
}

#[async_trait]
impl Handler for PersonJobHandler {
    fn required_services(&self) -> &'static [&'static str] {
        &["llm"]
    }

    async fn execute(&self, node: &ExecutableNode, inputs: Inputs, context: &ExecutionContext) -> Result<Envelope> {
        let NodeKind::PersonJob(params) = &node.kind else {
            return Err(EngineError::HandlerValidation {
                node_id: node.id.to_string(),
                message: "PersonJobHandler received a non-PersonJob node".into(),
            });
        };

        let execution_count = context
            .state
            .get_node_state(&context.execution_id, &node.id)
            .map(|s| s.execution_count.saturating_sub(1))
            .unwrap_or(0);

        let template = match (execution_count, &params.first_only_prompt) {
            (0, Some(first)) => first,
            _ => &params.default_prompt,
        };
        let prompt = interpolate(template, &inputs);

        let person_id = params.person_id.as_str();
        let llm = context.services.require::<Arc<dyn LlmServicePort>>("PersonJob", "llm")?;

        let mut messages = {
            let conversations = context.conversations.read();
            conversations.visible_messages(person_id, person_id)
        };
        if let Some(memorize_to) = &params.memorize_to {
            messages.retain(|m| {
                m.person_id.as_deref().map(|p| !memorize_to.ignore_person.iter().any(|ignored| ignored.as_str() == p)).unwrap_or(true)
            });
            messages = SubstringMemorySelector.select(messages, &memorize_to.criteria, memorize_to.at_most);
        }
        messages.push(ViewedMessage { role: Role::User, content: prompt.clone(), person_id: None });

        let response = llm
            .complete(CompletionRequest {
                messages,
                model: "default".to_string(),
                api_key_id: String::new(),
                tools: params.tools.clone(),
                text_format: params.text_format.clone(),
            })
            .await?;

        {
            let mut conversations = context.conversations.write();
            conversations.add_message(
                person_id,
                Message::new(Role::User, prompt).with_sender("__caller").with_execution(context.execution_id.to_string()).with_node(node.id.as_str(), node.label.as_str()),
            );
            conversations.add_message(
                person_id,
                Message::new(Role::Assistant, response.text.clone())
                    .with_sender(person_id)
                    .with_execution(context.execution_id.to_string())
                    .with_node(node.id.as_str(), node.label.as_str())
                    .with_token_counts(response.token_usage.input, response.token_usage.output, response.token_usage.cached),
            );
        }

        let conversation_view = {
            let conversations = context.conversations.read();
            conversations.view(person_id, person_id)
        };

        let mut envelope = Envelope::new(Value::String(response.text.clone()))
            .with_text(response.text.clone())
            .with_conversation(conversation_view);

        if params.text_format.is_some() {
            if let Ok(object) = serde_json::from_str::<Value>(&response.text) {
                envelope = envelope.with_representation(RepresentationKind::Object, crate::envelope::Representation::Object(object));
            }
        }

        Ok(envelope.with_meta(EnvelopeMeta {
            person_id: Some(person_id.to_string()),
            model: Some("default".to_string()),
            token_usage: Some(response.token_usage),
            memory_selection: params.memorize_to.as_ref().map(|m| m.criteria.clone()),
            ..Default::default()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolate_substitutes_named_variables() {
        let mut inputs = Inputs::new();
        inputs.insert("topic".to_string(), Value::String("rust".to_string()));
        assert_eq!(interpolate("write about {{topic}}", &inputs), "write about rust");
    }
}

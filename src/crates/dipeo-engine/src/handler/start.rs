//! `Start` handler (spec §4.9): "Emits the options-supplied `variables`
//! as an object envelope with a `default` output."

use async_trait::async_trait;

use crate::diagram::ExecutableNode;
use crate::envelope::Envelope;
use crate::error::Result;
use crate::resolver::Inputs;
use crate::runtime::ExecutionContext;

use super::Handler;

pub struct StartHandler;

#[async_trait]
impl Handler for StartHandler {
    async fn execute(&self, _node: &ExecutableNode, _inputs: Inputs, context: &ExecutionContext) -> Result<Envelope> {
        Ok(Envelope::new(context.options.variables.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{ExecutionId, NodeId};
    use crate::runtime::{ExecutionOptions, ServiceRegistry};
    use std::sync::Arc;

    #[tokio::test]
    async fn emits_options_variables_as_body() {
        let diagram = crate::diagram::compile(&crate::diagram::DomainDiagram {
            nodes: vec![crate::diagram::authored::AuthoredNode {
                id: "start".into(),
                kind: "Start".into(),
                label: None,
                data: serde_json::json!({}),
            }],
            arrows: vec![],
            metadata: Default::default(),
        })
        .unwrap();
        let node = crate::diagram::ExecutableNode::new(NodeId::new("start"), "Start", crate::diagram::NodeKind::Start);
        let options = Arc::new(ExecutionOptions { variables: serde_json::json!({"x": 21}), ..Default::default() });
        let context = ExecutionContext::new(
            ExecutionId::generate(),
            None,
            Arc::new(diagram),
            ServiceRegistry::new(),
            crate::state::StateManager::new(),
            Arc::new(crate::event::InMemoryEventBus::new()),
            options,
        );
        let envelope = StartHandler.execute(&node, Default::default(), &context).await.unwrap();
        assert_eq!(envelope.body, serde_json::json!({"x": 21}));
    }
}

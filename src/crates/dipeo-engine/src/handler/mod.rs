//! Node handlers: one stateless strategy per node kind (spec §4.9).

pub mod api_job;
pub mod code_job;
pub mod condition;
pub mod db;
pub mod end;
pub mod hook;
pub mod integrated_api;
pub mod json_schema_validator;
pub mod person_job;
pub mod start;
pub mod sub_diagram;
pub mod template_job;
pub mod typescript_ast;
pub mod user_response;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::diagram::ExecutableNode;
use crate::envelope::Envelope;
use crate::error::Result;
use crate::resolver::Inputs;
use crate::runtime::ExecutionContext;

/// A handler's declared dependencies and validation, checked once by
/// the registry at dispatch time rather than re-derived per call
/// (spec §4.9 "Handler contract").
#[async_trait]
pub trait Handler: Send + Sync {
    /// Service keys this handler requires from [`ExecutionContext`]'s
    /// registry; the engine fails fast with `MissingService` if absent.
    fn required_services(&self) -> &'static [&'static str] {
        &[]
    }

    async fn execute(&self, node: &ExecutableNode, inputs: Inputs, context: &ExecutionContext) -> Result<Envelope>;
}

/// Maps node kind tag (`node.kind.tag()`) to its handler
/// (spec §9 "Runtime reflection of handlers").
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<&'static str, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind_tag: &'static str, handler: Arc<dyn Handler>) {
        self.handlers.insert(kind_tag, handler);
    }

    pub fn get(&self, kind_tag: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(kind_tag).cloned()
    }

    /// The registry pre-wired with this crate's built-in handlers
    /// (spec §4.9 "Per node-type behaviors").
    pub fn with_builtin_handlers() -> Self {
        let mut registry = Self::new();
        registry.register("Start", Arc::new(start::StartHandler));
        registry.register("End", Arc::new(end::EndHandler));
        registry.register("PersonJob", Arc::new(person_job::PersonJobHandler));
        registry.register("CodeJob", Arc::new(code_job::CodeJobHandler));
        registry.register("ApiJob", Arc::new(api_job::ApiJobHandler));
        registry.register("Condition", Arc::new(condition::ConditionHandler));
        registry.register("Db", Arc::new(db::DbHandler));
        registry.register("TemplateJob", Arc::new(template_job::TemplateJobHandler));
        registry.register("SubDiagram", Arc::new(sub_diagram::SubDiagramHandler));
        registry.register("UserResponse", Arc::new(user_response::UserResponseHandler));
        registry.register("Hook", Arc::new(hook::HookHandler));
        registry.register("JsonSchemaValidator", Arc::new(json_schema_validator::JsonSchemaValidatorHandler));
        registry.register("TypescriptAst", Arc::new(typescript_ast::TypescriptAstHandler));
        registry.register("IntegratedApi", Arc::new(integrated_api::IntegratedApiHandler));
        registry
    }
}

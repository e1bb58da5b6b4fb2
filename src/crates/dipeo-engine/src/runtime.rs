//! Execution-scoped dependency container (spec §9 "Global mutable
//! state": "treat these as explicit dependencies passed via a
//! container; construct per-process on startup").
//!
//! [`ExecutionContext`] is what a handler's `services` and `context`
//! parameters resolve to (spec §4.9 `execute(node, inputs, services,
//! context)`): the service registry for ports, plus the execution's
//! diagram, conversation store, and cancellation signal.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::conversation::ConversationStore;
use crate::diagram::ExecutableDiagram;
use crate::error::{EngineError, Result};
use crate::event::EventBus;
use crate::ids::ExecutionId;
use crate::state::StateManager;

/// Options accepted by an execution invocation (spec §6 "Options").
#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    pub variables: serde_json::Value,
    pub debug_mode: bool,
    pub max_iterations: u32,
    pub timeout_seconds: u64,
    pub concurrency_limit: Option<usize>,
    pub continue_on_error: bool,
    pub diagram_source_path: Option<String>,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            variables: serde_json::json!({}),
            debug_mode: false,
            max_iterations: 100,
            timeout_seconds: 300,
            concurrency_limit: None,
            continue_on_error: false,
            diagram_source_path: None,
        }
    }
}

/// Type-erased registry of service ports, keyed by `TypeId`. Entries
/// are stored by their concrete handle type — typically `Arc<dyn
/// LlmServicePort>` — so a handler can ask for a port without the
/// registry needing to know every port trait ahead of time.
#[derive(Default, Clone)]
pub struct ServiceRegistry {
    services: Arc<RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: Clone + Send + Sync + 'static>(&self, service: T) {
        self.services.write().insert(TypeId::of::<T>(), Arc::new(service));
    }

    pub fn get<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        self.services.read().get(&TypeId::of::<T>()).and_then(|svc| svc.downcast_ref::<T>()).cloned()
    }

    /// Fetch a service or fail with `MissingService`, the shape a
    /// handler's `execute` needs when a required port is absent
    /// (spec §4.9 handler contract, §7 "Handler errors:
    /// dependency-missing").
    pub fn require<T: Clone + Send + Sync + 'static>(&self, handler: &str, service: &str) -> Result<T> {
        self.get::<T>()
            .ok_or_else(|| EngineError::MissingService { handler: handler.to_string(), service: service.to_string() })
    }
}

/// Everything a handler needs beyond its own node and inputs.
#[derive(Clone)]
pub struct ExecutionContext {
    pub execution_id: ExecutionId,
    pub parent_execution_id: Option<ExecutionId>,
    pub diagram: Arc<ExecutableDiagram>,
    pub services: ServiceRegistry,
    pub conversations: Arc<RwLock<ConversationStore>>,
    pub state: StateManager,
    pub event_bus: Arc<dyn EventBus>,
    pub options: Arc<ExecutionOptions>,
    pub cancellation: CancellationToken,
}

impl ExecutionContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        execution_id: ExecutionId,
        parent_execution_id: Option<ExecutionId>,
        diagram: Arc<ExecutableDiagram>,
        services: ServiceRegistry,
        state: StateManager,
        event_bus: Arc<dyn EventBus>,
        options: Arc<ExecutionOptions>,
    ) -> Self {
        Self {
            execution_id,
            parent_execution_id,
            diagram,
            services,
            conversations: Arc::new(RwLock::new(ConversationStore::new())),
            state,
            event_bus,
            options,
            cancellation: CancellationToken::new(),
        }
    }

    /// A context for a sub-diagram's child engine: shares the service
    /// registry, state manager (so the parent can observe child node
    /// states), and event bus (so observers see child events too, per
    /// `propagate_to_sub`), plus the cancellation lineage (so a parent
    /// abort cancels children too) (spec §4.7 "Sub-diagram").
    pub fn child_context(
        &self,
        execution_id: ExecutionId,
        diagram: Arc<ExecutableDiagram>,
        options: Arc<ExecutionOptions>,
    ) -> Self {
        Self {
            execution_id,
            parent_execution_id: Some(self.execution_id.clone()),
            diagram,
            services: self.services.clone(),
            conversations: Arc::new(RwLock::new(ConversationStore::new())),
            state: self.state.clone(),
            event_bus: Arc::clone(&self.event_bus),
            options,
            cancellation: self.cancellation.child_token(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter: Send + Sync {
        fn greet(&self) -> &str;
    }

    struct EnglishGreeter;
    impl Greeter for EnglishGreeter {
        fn greet(&self) -> &str {
            "hello"
        }
    }

    #[test]
    fn registry_round_trips_a_trait_object_by_handle_type() {
        let registry = ServiceRegistry::new();
        registry.insert(Arc::new(EnglishGreeter) as Arc<dyn Greeter>);
        let fetched = registry.get::<Arc<dyn Greeter>>().unwrap();
        assert_eq!(fetched.greet(), "hello");
    }

    #[test]
    fn missing_service_surfaces_as_engine_error() {
        let registry = ServiceRegistry::new();
        let result = registry.require::<Arc<dyn Greeter>>("PersonJob", "llm");
        assert!(result.is_err());
    }
}

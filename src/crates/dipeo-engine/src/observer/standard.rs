//! Standard observers (spec §4.4 "Standard observers").

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::envelope::TokenUsage;
use crate::event::{DomainEvent, EventType};
use crate::ids::ExecutionId;
use crate::ports::MessageRouterPort;
use crate::state::StateManager;

use super::Observer;

/// Persists each event and its derived snapshot. Idempotent on
/// duplicate `seq` because [`StateManager::apply_event`] already is.
pub struct StateStoreObserver {
    state_manager: StateManager,
}

impl StateStoreObserver {
    pub fn new(state_manager: StateManager) -> Self {
        Self { state_manager }
    }
}

#[async_trait]
impl Observer for StateStoreObserver {
    async fn on_event(&self, event: &DomainEvent) {
        if let Err(err) = self.state_manager.apply_event(event.clone()) {
            tracing::warn!(error = %err, "state store observer failed to apply event");
        }
    }
}

/// Serializes events to a transport via [`MessageRouterPort`].
/// `propagate_to_sub`/`scope_to_execution` are honored by wrapping this
/// observer in a [`super::ScopedObserver`] rather than duplicating that
/// logic here.
pub struct StreamingObserver {
    router: Arc<dyn MessageRouterPort>,
    execution_id: ExecutionId,
    event_type_filter: Option<Vec<EventType>>,
}

impl StreamingObserver {
    pub fn new(router: Arc<dyn MessageRouterPort>, execution_id: ExecutionId) -> Self {
        Self { router, execution_id, event_type_filter: None }
    }

    pub fn with_event_type_filter(mut self, types: Vec<EventType>) -> Self {
        self.event_type_filter = Some(types);
        self
    }
}

#[async_trait]
impl Observer for StreamingObserver {
    async fn on_event(&self, event: &DomainEvent) {
        if let Some(filter) = &self.event_type_filter {
            if !filter.contains(&event.event_type) {
                return;
            }
        }
        self.router.publish(&self.execution_id, event).await;
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    pub status: Option<String>,
    pub final_outputs: Vec<serde_json::Value>,
    pub error: Option<String>,
}

/// Collects final outputs and status for a CLI or a synchronous caller
/// awaiting the result of `invoke`-style execution.
#[derive(Default)]
pub struct ResultObserver {
    result: Mutex<ExecutionResult>,
}

impl ResultObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ExecutionResult {
        self.result.lock().clone()
    }
}

#[async_trait]
impl Observer for ResultObserver {
    async fn on_event(&self, event: &DomainEvent) {
        let mut result = self.result.lock();
        match event.event_type {
            EventType::NodeCompleted => {
                if let Some(summary) = event.payload.get("output_summary") {
                    result.final_outputs.push(summary.clone());
                }
            }
            EventType::ExecutionCompleted => {
                result.status = Some("COMPLETED".to_string());
            }
            EventType::ExecutionError => {
                result.status = Some("FAILED".to_string());
                result.error = event.payload.get("error_message").and_then(|v| v.as_str()).map(String::from);
            }
            _ => {}
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub nodes_completed: u64,
    pub nodes_errored: u64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
}

/// Aggregates durations, token counts, and bottleneck stats across an
/// execution (spec §4.4 "MetricsObserver").
#[derive(Default)]
pub struct MetricsObserver {
    nodes_completed: AtomicU64,
    nodes_errored: AtomicU64,
    total_input_tokens: AtomicU64,
    total_output_tokens: AtomicU64,
}

impl MetricsObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            nodes_completed: self.nodes_completed.load(Ordering::SeqCst),
            nodes_errored: self.nodes_errored.load(Ordering::SeqCst),
            total_input_tokens: self.total_input_tokens.load(Ordering::SeqCst),
            total_output_tokens: self.total_output_tokens.load(Ordering::SeqCst),
        }
    }
}

#[async_trait]
impl Observer for MetricsObserver {
    async fn on_event(&self, event: &DomainEvent) {
        match event.event_type {
            EventType::NodeCompleted => {
                self.nodes_completed.fetch_add(1, Ordering::SeqCst);
                if let Some(usage) = event.payload.get("token_usage") {
                    if let Ok(usage) = serde_json::from_value::<TokenUsage>(usage.clone()) {
                        self.total_input_tokens.fetch_add(usage.input as u64, Ordering::SeqCst);
                        self.total_output_tokens.fetch_add(usage.output as u64, Ordering::SeqCst);
                    }
                }
            }
            EventType::NodeError => {
                self.nodes_errored.fetch_add(1, Ordering::SeqCst);
            }
            _ => {}
        }
    }
}

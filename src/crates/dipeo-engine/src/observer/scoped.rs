//! Scoping wrapper used when launching a sub-diagram (spec §4.4
//! "Scoped observer").

use async_trait::async_trait;

use crate::event::{DomainEvent, EventType};
use crate::ids::ExecutionId;

use super::Observer;

/// How a parent observer should treat events from a sub-diagram
/// (spec §4.4 "decide per observer whether to propagate, scope, or
/// filter").
#[derive(Debug, Clone, Default)]
pub struct ObserverMetadata {
    pub propagate_to_sub: bool,
    pub scope_to_execution: bool,
    pub filter_events: Option<Vec<EventType>>,
}

impl ObserverMetadata {
    pub fn new() -> Self {
        Self { propagate_to_sub: true, scope_to_execution: false, filter_events: None }
    }
}

/// Wraps a base observer, filtering events by execution scope and/or
/// event type before forwarding (spec §4.4).
pub struct ScopedObserver {
    base: Box<dyn Observer>,
    scope: ExecutionId,
    metadata: ObserverMetadata,
}

impl ScopedObserver {
    pub fn new(base: Box<dyn Observer>, scope: ExecutionId, metadata: ObserverMetadata) -> Self {
        Self { base, scope, metadata }
    }

    fn should_propagate(&self, event: &DomainEvent) -> bool {
        if self.metadata.scope_to_execution && event.scope.execution_id != self.scope {
            return false;
        }
        if let Some(filter) = &self.metadata.filter_events {
            if !filter.contains(&event.event_type) {
                return false;
            }
        }
        true
    }
}

#[async_trait]
impl Observer for ScopedObserver {
    async fn on_event(&self, event: &DomainEvent) {
        if self.should_propagate(event) {
            self.base.on_event(event).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventMeta, EventScope};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counter(Arc<AtomicUsize>);

    #[async_trait]
    impl Observer for Counter {
        async fn on_event(&self, _event: &DomainEvent) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn event(execution_id: ExecutionId) -> DomainEvent {
        DomainEvent {
            event_type: EventType::NodeStarted,
            scope: EventScope { execution_id, parent_execution_id: None },
            payload: serde_json::json!({}),
            meta: EventMeta { seq: 1, pipeline_event_count: 1, pipeline_uptime_ms: 0 },
        }
    }

    #[tokio::test]
    async fn scope_to_execution_filters_out_other_executions() {
        let count = Arc::new(AtomicUsize::new(0));
        let scope = ExecutionId::generate();
        let observer = ScopedObserver::new(
            Box::new(Counter(count.clone())),
            scope.clone(),
            ObserverMetadata { propagate_to_sub: true, scope_to_execution: true, filter_events: None },
        );
        observer.on_event(&event(scope)).await;
        observer.on_event(&event(ExecutionId::generate())).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}

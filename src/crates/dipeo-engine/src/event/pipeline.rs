//! Per-execution event construction and publication (spec §4.3).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::warn;

use crate::diagram::ExecutableNode;
use crate::envelope::Envelope;
use crate::ids::ExecutionId;

use super::bus::EventBus;
use super::types::{DomainEvent, EventMeta, EventScope, EventType};

/// Truncate an envelope's body into the short human-readable summary
/// carried on `NODE_COMPLETED` (spec §4.3 step b).
pub fn summarize_output(envelope: &Envelope) -> String {
    match &envelope.body {
        Value::String(s) if s.chars().count() > 100 => {
            let truncated: String = s.chars().take(100).collect();
            format!("{truncated}…")
        }
        Value::String(s) => s.clone(),
        Value::Object(map) => format!("{{{} keys}}", map.len()),
        Value::Array(items) => format!("[{} items]", items.len()),
        other => other.to_string(),
    }
}

/// One pipeline instance per execution (spec §4.3 "One pipeline per
/// execution"). Stamps `seq`, event count, and uptime on every event,
/// then hands it to the [`EventBus`] fire-and-forget.
pub struct EventPipeline {
    execution_id: ExecutionId,
    parent_execution_id: Option<ExecutionId>,
    bus: Arc<dyn EventBus>,
    seq: AtomicU64,
    event_count: AtomicU64,
    started_at: Instant,
}

impl EventPipeline {
    pub fn new(execution_id: ExecutionId, parent_execution_id: Option<ExecutionId>, bus: Arc<dyn EventBus>) -> Self {
        Self {
            execution_id,
            parent_execution_id,
            bus,
            seq: AtomicU64::new(0),
            event_count: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    fn scope(&self) -> EventScope {
        EventScope {
            execution_id: self.execution_id.clone(),
            parent_execution_id: self.parent_execution_id.clone(),
        }
    }

    fn meta(&self) -> EventMeta {
        EventMeta {
            seq: self.seq.fetch_add(1, Ordering::SeqCst) + 1,
            pipeline_event_count: self.event_count.fetch_add(1, Ordering::SeqCst),
            pipeline_uptime_ms: self.started_at.elapsed().as_millis() as u64,
        }
    }

    async fn emit(&self, event_type: EventType, payload: Value) -> DomainEvent {
        let event = DomainEvent { event_type, scope: self.scope(), payload, meta: self.meta() };
        // Publication failures are logged, never fatal to the engine
        // (spec §4.3 "Publication failures are logged but never crash
        // the engine").
        self.bus.publish(event.clone()).await;
        event
    }

    pub async fn emit_execution_started(&self, diagram_name: Option<&str>, variables: &Value) -> DomainEvent {
        self.emit(
            EventType::ExecutionStarted,
            serde_json::json!({ "diagram_name": diagram_name, "variables": variables }),
        )
        .await
    }

    pub async fn emit_execution_completed(&self, status: &str) -> DomainEvent {
        self.emit(EventType::ExecutionCompleted, serde_json::json!({ "status": status })).await
    }

    pub async fn emit_execution_error(&self, error_message: &str, error_type: &str, diagram_id: Option<&str>) -> DomainEvent {
        self.emit(
            EventType::ExecutionError,
            serde_json::json!({
                "error_message": error_message,
                "error_type": error_type,
                "diagram_id": diagram_id,
            }),
        )
        .await
    }

    pub async fn emit_node_started(&self, node: &ExecutableNode, execution_count: u32) -> DomainEvent {
        self.emit(
            EventType::NodeStarted,
            serde_json::json!({ "node_id": node.id.as_str(), "execution_count": execution_count }),
        )
        .await
    }

    pub async fn emit_node_completed(&self, node: &ExecutableNode, envelope: &Envelope, duration_ms: u64) -> DomainEvent {
        let output_summary = summarize_output(envelope);
        self.emit(
            EventType::NodeCompleted,
            serde_json::json!({
                "node_id": node.id.as_str(),
                "status": "COMPLETED",
                "output_summary": output_summary,
                "duration_ms": duration_ms,
                "token_usage": envelope.meta.token_usage,
                "person_id": envelope.meta.person_id,
                "model": envelope.meta.model,
            }),
        )
        .await
    }

    pub async fn emit_node_skipped(&self, node: &ExecutableNode) -> DomainEvent {
        self.emit(
            EventType::NodeCompleted,
            serde_json::json!({ "node_id": node.id.as_str(), "status": "SKIPPED" }),
        )
        .await
    }

    pub async fn emit_node_maxiter_reached(&self, node: &ExecutableNode) -> DomainEvent {
        self.emit(
            EventType::NodeCompleted,
            serde_json::json!({ "node_id": node.id.as_str(), "status": "MAXITER_REACHED" }),
        )
        .await
    }

    pub async fn emit_node_error(&self, node: &ExecutableNode, error_message: &str, error_type: &str) -> DomainEvent {
        self.emit(
            EventType::NodeError,
            serde_json::json!({
                "node_id": node.id.as_str(),
                "error_message": error_message,
                "error_type": error_type,
            }),
        )
        .await
    }
}

/// A seam for forwarding events to a remote monitor over an external
/// transport (spec §4.4 "EventForwarder — forwards to a remote server
/// ... when running under an external monitor"). The core ships no
/// concrete transport; a host process implements this against its own
/// GraphQL/WebSocket client and subscribes it like any other observer.
#[async_trait::async_trait]
pub trait EventForwarder: Send + Sync {
    async fn forward(&self, event: &DomainEvent);

    fn on_forward_error(&self, error: &str) {
        warn!(error, "event forwarding failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summarize_output_truncates_long_strings() {
        let long = "x".repeat(150);
        let envelope = Envelope::new(Value::String(long));
        let summary = summarize_output(&envelope);
        assert_eq!(summary.chars().count(), 101);
    }

    #[test]
    fn summarize_output_reports_object_key_count() {
        let envelope = Envelope::new(serde_json::json!({"a": 1, "b": 2}));
        assert_eq!(summarize_output(&envelope), "{2 keys}");
    }

    #[tokio::test]
    async fn seq_is_monotonic_starting_at_one() {
        let bus: Arc<dyn EventBus> = Arc::new(crate::event::bus::InMemoryEventBus::new());
        let mut sub = bus.subscribe();
        let pipeline = EventPipeline::new(ExecutionId::generate(), None, bus);
        pipeline.emit_execution_started(None, &serde_json::json!({})).await;
        pipeline.emit_execution_completed("COMPLETED").await;

        let first = sub.recv().await.unwrap();
        let second = sub.recv().await.unwrap();
        assert_eq!(first.meta.seq, 1);
        assert_eq!(second.meta.seq, 2);
    }
}

//! Compiles and runs a tiny three-node diagram (`Start -> CodeJob -> End`)
//! against an in-process sandbox stub, draining the event bus into the
//! standard observers as a host process would.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use dipeo_engine::diagram::authored::{AuthoredArrow, AuthoredNode, DiagramMetadata};
use dipeo_engine::diagram::{compile, DomainDiagram};
use dipeo_engine::engine::ExecutionEngine;
use dipeo_engine::error::{EngineError, Result};
use dipeo_engine::event::InMemoryEventBus;
use dipeo_engine::handler::HandlerRegistry;
use dipeo_engine::ids::ExecutionId;
use dipeo_engine::observer::{MetricsObserver, Observer, ResultObserver};
use dipeo_engine::ports::{SandboxPort, SandboxResult};
use dipeo_engine::runtime::{ExecutionContext, ExecutionOptions, ServiceRegistry};
use dipeo_engine::state::StateManager;

struct DoublingSandbox;

#[async_trait]
impl SandboxPort for DoublingSandbox {
    async fn execute(&self, _language: &str, _code: &str, inputs: &Value) -> Result<SandboxResult> {
        let x = inputs.get("x").and_then(Value::as_i64).ok_or_else(|| EngineError::Port("missing 'x' input".into()))?;
        Ok(SandboxResult { return_value: Some(json!(x * 2)), stdout: String::new(), stderr: String::new() })
    }
}

fn node(id: &str, kind: &str, data: Value) -> AuthoredNode {
    AuthoredNode { id: id.to_string(), kind: kind.to_string(), label: None, data }
}

fn arrow(id: &str, source: &str, target: &str) -> AuthoredArrow {
    AuthoredArrow { id: id.to_string(), source: source.to_string(), target: target.to_string(), content_type: None, label: None }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let diagram = DomainDiagram {
        nodes: vec![
            node("start", "Start", json!({})),
            node("double", "CodeJob", json!({"language": "python", "code": "x * 2"})),
            node("end", "End", json!({})),
        ],
        arrows: vec![
            arrow("e1", "start:default:output", "double:x:input"),
            arrow("e2", "double:default:output", "end:default:input"),
        ],
        metadata: DiagramMetadata::default(),
    };
    let executable = Arc::new(compile(&diagram)?);

    let services = ServiceRegistry::new();
    services.insert(Arc::new(DoublingSandbox) as Arc<dyn SandboxPort>);

    let bus = Arc::new(InMemoryEventBus::new());
    let results = Arc::new(ResultObserver::new());
    let metrics = Arc::new(MetricsObserver::new());
    spawn_observers(Arc::clone(&bus), vec![results.clone(), metrics.clone()]);

    let context = ExecutionContext::new(
        ExecutionId::generate(),
        None,
        executable,
        services,
        StateManager::new(),
        bus,
        Arc::new(ExecutionOptions { variables: json!(21), ..Default::default() }),
    );

    let engine = ExecutionEngine::new(Arc::new(HandlerRegistry::with_builtin_handlers()));
    let outcome = engine.run(&context).await?;

    tracing::info!(status = ?outcome.status, "execution finished");
    println!("result: {:?}", results.snapshot());
    println!("metrics: {:?}", metrics.snapshot());
    Ok(())
}

/// Forward every published event to each observer in turn, the way a
/// host process wires [`Observer`]s to the bus (spec §4.4 calls this
/// the caller's responsibility, not the bus's).
fn spawn_observers(bus: Arc<dyn dipeo_engine::event::EventBus>, observers: Vec<Arc<dyn Observer>>) {
    let mut subscription = bus.subscribe();
    tokio::spawn(async move {
        while let Some(event) = subscription.recv().await {
            for observer in &observers {
                observer.on_event(&event).await;
            }
        }
    });
}

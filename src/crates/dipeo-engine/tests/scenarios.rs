//! End-to-end scenarios exercising the tick loop, scheduler, and event
//! pipeline together against stub ports (spec §8).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use dipeo_engine::diagram::authored::{AuthoredArrow, AuthoredNode, DiagramMetadata};
use dipeo_engine::diagram::{compile, ContentType, DomainDiagram};
use dipeo_engine::engine::ExecutionEngine;
use dipeo_engine::error::{EngineError, Result as EngineResult};
use dipeo_engine::event::{EventBus, EventType, InMemoryEventBus};
use dipeo_engine::handler::HandlerRegistry;
use dipeo_engine::ids::{ExecutionId, NodeId};
use dipeo_engine::ports::{
    CompletionRequest, CompletionResponse, DiagramRepositoryPort, LlmServicePort, SandboxPort, SandboxResult,
};
use dipeo_engine::runtime::{ExecutionContext, ExecutionOptions, ServiceRegistry};
use dipeo_engine::state::{ExecutionStatus, StateManager};

fn node(id: &str, kind: &str, data: Value) -> AuthoredNode {
    AuthoredNode { id: id.to_string(), kind: kind.to_string(), label: None, data }
}

/// An edge that passes its source's JSON body through unchanged —
/// scalars, objects, whatever — rather than the `RawText` default's
/// stringify-everything behavior.
fn passthrough(id: &str, source: &str, target: &str) -> AuthoredArrow {
    AuthoredArrow {
        id: id.to_string(),
        source: source.to_string(),
        target: target.to_string(),
        content_type: Some(ContentType::Object),
        label: None,
    }
}

fn context(diagram: DomainDiagram, services: ServiceRegistry, options: ExecutionOptions) -> (ExecutionContext, ExecutionId) {
    let execution_id = ExecutionId::generate();
    let executable = Arc::new(compile(&diagram).expect("diagram compiles"));
    let ctx = ExecutionContext::new(
        execution_id.clone(),
        None,
        executable,
        services,
        StateManager::new(),
        Arc::new(InMemoryEventBus::new()),
        Arc::new(options),
    );
    (ctx, execution_id)
}

struct DoublingSandbox;

#[async_trait]
impl SandboxPort for DoublingSandbox {
    async fn execute(&self, _language: &str, _code: &str, inputs: &Value) -> EngineResult<SandboxResult> {
        let x = inputs.get("x").and_then(Value::as_i64).ok_or_else(|| EngineError::Port("missing 'x' input".into()))?;
        Ok(SandboxResult { return_value: Some(json!(x * 2)), stdout: String::new(), stderr: String::new() })
    }
}

struct StaticLlm(&'static str);

#[async_trait]
impl LlmServicePort for StaticLlm {
    async fn complete(&self, _request: CompletionRequest) -> EngineResult<CompletionResponse> {
        Ok(CompletionResponse { text: self.0.to_string(), raw: Value::Null, token_usage: Default::default(), tool_outputs: None })
    }
}

/// An LLM stub slow enough to blow a short per-node timeout.
struct SlowLlm;

#[async_trait]
impl LlmServicePort for SlowLlm {
    async fn complete(&self, _request: CompletionRequest) -> EngineResult<CompletionResponse> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(CompletionResponse { text: "too late".to_string(), raw: Value::Null, token_usage: Default::default(), tool_outputs: None })
    }
}

/// S1: `Start -> CodeJob(x*2) -> End`, expecting `body=42` and a
/// precise 8-event ordered log (spec §8 S1).
#[tokio::test]
async fn s1_linear_diagram_doubles_input_and_logs_eight_events() {
    let services = ServiceRegistry::new();
    services.insert(Arc::new(DoublingSandbox) as Arc<dyn SandboxPort>);

    let diagram = DomainDiagram {
        nodes: vec![
            node("start", "Start", json!({})),
            node("code", "CodeJob", json!({"language": "python", "code": "x * 2"})),
            node("end", "End", json!({})),
        ],
        arrows: vec![
            passthrough("e1", "start:default:output", "code:x:input"),
            passthrough("e2", "code:default:output", "end:default:input"),
        ],
        metadata: DiagramMetadata::default(),
    };
    let options = ExecutionOptions { variables: json!(21), ..Default::default() };
    let (ctx, execution_id) = context(diagram, services, options);

    let engine = ExecutionEngine::new(Arc::new(HandlerRegistry::with_builtin_handlers()));
    let outcome = engine.run(&ctx).await.unwrap();

    assert_eq!(outcome.status, ExecutionStatus::Completed);
    assert_eq!(outcome.outputs.get(&NodeId::new("end")).unwrap().body, json!(42));

    let events = ctx.state.get_events(&execution_id, 0);
    let types: Vec<EventType> = events.iter().map(|e| e.event_type).collect();
    assert_eq!(
        types,
        vec![
            EventType::ExecutionStarted,
            EventType::NodeStarted,
            EventType::NodeCompleted,
            EventType::NodeStarted,
            EventType::NodeCompleted,
            EventType::NodeStarted,
            EventType::NodeCompleted,
            EventType::ExecutionCompleted,
        ]
    );
}

/// S2: `Start -> Condition(x>0) -> [condtrue->A, condfalse->B] -> End`
/// with `x=5` — `A` runs, `B` never starts, and the execution still
/// reaches `COMPLETED` (spec §8 S2).
#[tokio::test]
async fn s2_condition_branch_completes_without_the_unreached_side() {
    let services = ServiceRegistry::new();
    services.insert(Arc::new(DoublingSandbox) as Arc<dyn SandboxPort>);

    let diagram = DomainDiagram {
        nodes: vec![
            node("start", "Start", json!({})),
            node("cond", "Condition", json!({"condition_type": "expression", "expression": "x > 0"})),
            node("a", "CodeJob", json!({"language": "python", "code": "x * 2"})),
            node("b", "CodeJob", json!({"language": "python", "code": "x * 2"})),
            node("end", "End", json!({})),
        ],
        arrows: vec![
            // `cond` only needs `x` to decide; `a`/`b` need it again
            // directly from `start` to compute with, since `cond`'s own
            // output is the boolean decision, not a pass-through of `x`.
            passthrough("e1", "start:default:output", "cond:x:input"),
            passthrough("e_ax", "start:default:output", "a:x:input"),
            passthrough("e_bx", "start:default:output", "b:x:input"),
            passthrough("e2", "cond:condtrue:output", "a:gate:input"),
            passthrough("e3", "cond:condfalse:output", "b:gate:input"),
            passthrough("e4", "a:default:output", "end:default:input"),
            passthrough("e5", "b:default:output", "end:default:input"),
        ],
        metadata: DiagramMetadata::default(),
    };
    let options = ExecutionOptions { variables: json!(5), ..Default::default() };
    let (ctx, execution_id) = context(diagram, services, options);

    let engine = ExecutionEngine::new(Arc::new(HandlerRegistry::with_builtin_handlers()));
    let outcome = engine.run(&ctx).await.unwrap();

    assert_eq!(outcome.status, ExecutionStatus::Completed);
    assert_eq!(outcome.outputs.get(&NodeId::new("end")).unwrap().body, json!(10));

    let a_state = ctx.state.get_node_state(&execution_id, &NodeId::new("a")).unwrap();
    assert_eq!(a_state.status, Some(ExecutionStatus::Completed));

    let b_state = ctx.state.get_node_state(&execution_id, &NodeId::new("b")).unwrap();
    assert_eq!(b_state.status, Some(ExecutionStatus::Skipped));
}

/// S3: a `PersonJob` with `max_iteration=3` fed by a `Condition` that
/// always evaluates true runs exactly three times, reaches
/// `MAXITER_REACHED`, and the execution still completes (spec §8 S3).
#[tokio::test]
async fn s3_person_job_stops_at_max_iteration() {
    let services = ServiceRegistry::new();
    services.insert(Arc::new(StaticLlm("ok")) as Arc<dyn LlmServicePort>);

    let diagram = DomainDiagram {
        nodes: vec![
            node("start", "Start", json!({})),
            node(
                "p",
                "PersonJob",
                json!({"person_id": "reviewer", "default_prompt": "go", "max_iteration": 3}),
            ),
            node("c", "Condition", json!({"condition_type": "expression", "expression": "true"})),
        ],
        arrows: vec![
            AuthoredArrow { id: "e1".into(), source: "start:default:output".into(), target: "p:default:input".into(), content_type: None, label: None },
            AuthoredArrow { id: "e2".into(), source: "p:default:output".into(), target: "c:default:input".into(), content_type: None, label: None },
            AuthoredArrow { id: "e3".into(), source: "c:condtrue:output".into(), target: "p:default:input".into(), content_type: None, label: None },
        ],
        metadata: DiagramMetadata::default(),
    };
    let (ctx, execution_id) = context(diagram, services, ExecutionOptions::default());

    let engine = ExecutionEngine::new(Arc::new(HandlerRegistry::with_builtin_handlers()));
    let outcome = engine.run(&ctx).await.unwrap();

    assert_eq!(outcome.status, ExecutionStatus::Completed);

    let p_state = ctx.state.get_node_state(&execution_id, &NodeId::new("p")).unwrap();
    assert_eq!(p_state.execution_count, 3);
    assert_eq!(p_state.status, Some(ExecutionStatus::MaxiterReached));
}

struct SingleDiagramRepository {
    diagram: DomainDiagram,
}

#[async_trait]
impl DiagramRepositoryPort for SingleDiagramRepository {
    async fn load(&self, _name_or_id: &str) -> EngineResult<DomainDiagram> {
        Ok(self.diagram.clone())
    }
}

/// S4: a `SubDiagram` node runs a child diagram to completion with its
/// own `execution_id`, linked to the parent via `parent_execution_id`,
/// and returns the child's `End` output as its own body (spec §8 S4).
#[tokio::test]
async fn s4_sub_diagram_runs_child_as_a_sibling_execution() {
    let child = DomainDiagram {
        nodes: vec![node("cstart", "Start", json!({})), node("cend", "End", json!({}))],
        arrows: vec![passthrough("c1", "cstart:default:output", "cend:default:input")],
        metadata: DiagramMetadata::default(),
    };

    let services = ServiceRegistry::new();
    services.insert(Arc::new(SingleDiagramRepository { diagram: child }) as Arc<dyn DiagramRepositoryPort>);

    let diagram = DomainDiagram {
        nodes: vec![
            node("start", "Start", json!({})),
            node("sd", "SubDiagram", json!({"diagram_name": "child"})),
        ],
        arrows: vec![passthrough("e1", "start:default:output", "sd:q:input")],
        metadata: DiagramMetadata::default(),
    };
    let options = ExecutionOptions { variables: json!("hello"), ..Default::default() };
    let (ctx, execution_id) = context(diagram, services, options);

    let mut sub = ctx.event_bus.subscribe();

    let engine = ExecutionEngine::new(Arc::new(HandlerRegistry::with_builtin_handlers()));
    let outcome = engine.run(&ctx).await.unwrap();

    assert_eq!(outcome.status, ExecutionStatus::Completed);
    assert_eq!(outcome.outputs.get(&NodeId::new("sd")).unwrap().body, json!({"q": "hello"}));

    let mut child_started_linked_to_parent = false;
    let mut saw_child_execution_completed = false;
    for _ in 0..12 {
        let event = sub.recv().await.expect("all expected events are published before run() returns");
        if event.scope.execution_id != execution_id {
            match event.event_type {
                EventType::ExecutionStarted => {
                    assert_eq!(event.scope.parent_execution_id.as_ref(), Some(&execution_id));
                    child_started_linked_to_parent = true;
                }
                EventType::ExecutionCompleted => saw_child_execution_completed = true,
                _ => {}
            }
        }
    }
    assert!(child_started_linked_to_parent, "child ExecutionStarted must carry parent_execution_id");
    assert!(saw_child_execution_completed, "child execution must reach ExecutionCompleted");
}

/// S5: a node-level timeout during a slow `PersonJob` call fails the
/// whole execution with `EXECUTION_ERROR` carrying `error_type=Timeout`,
/// without ever completing that node (spec §8 S5).
#[tokio::test(start_paused = true)]
async fn s5_slow_node_times_out_and_fails_the_execution() {
    let services = ServiceRegistry::new();
    services.insert(Arc::new(SlowLlm) as Arc<dyn LlmServicePort>);

    let diagram = DomainDiagram {
        nodes: vec![
            node("start", "Start", json!({})),
            node("p", "PersonJob", json!({"person_id": "reviewer", "default_prompt": "go", "max_iteration": 1})),
        ],
        arrows: vec![AuthoredArrow {
            id: "e1".into(),
            source: "start:default:output".into(),
            target: "p:default:input".into(),
            content_type: None,
            label: None,
        }],
        metadata: DiagramMetadata::default(),
    };
    let options = ExecutionOptions { timeout_seconds: 1, ..Default::default() };
    let (ctx, execution_id) = context(diagram, services, options);

    let engine = ExecutionEngine::new(Arc::new(HandlerRegistry::with_builtin_handlers()));
    let outcome = engine.run(&ctx).await.unwrap();

    assert_eq!(outcome.status, ExecutionStatus::Failed);
    assert_eq!(outcome.error_type.as_deref(), Some("Timeout"));

    let snapshot = ctx.state.get_state(&execution_id).unwrap();
    assert_eq!(snapshot.status, ExecutionStatus::Failed);

    let p_state = ctx.state.get_node_state(&execution_id, &NodeId::new("p")).unwrap();
    assert_eq!(p_state.status, Some(ExecutionStatus::Failed));
    assert!(p_state.error.as_deref().unwrap_or("").contains("timed out"));
}

/// S6: two nodes each consuming the other's never-produced output, with
/// no entry node to break the cycle — `EXECUTION_ERROR` with
/// `error_type=Deadlock` (spec §8 S6).
#[tokio::test]
async fn s6_mutual_dependency_with_no_entry_node_deadlocks() {
    let diagram = DomainDiagram {
        nodes: vec![
            node("a", "CodeJob", json!({"language": "python", "code": "1"})),
            node("b", "CodeJob", json!({"language": "python", "code": "1"})),
        ],
        arrows: vec![
            passthrough("e1", "a:default:output", "b:default:input"),
            passthrough("e2", "b:default:output", "a:default:input"),
        ],
        metadata: DiagramMetadata::default(),
    };
    let services = ServiceRegistry::new();
    services.insert(Arc::new(DoublingSandbox) as Arc<dyn SandboxPort>);
    let (ctx, execution_id) = context(diagram, services, ExecutionOptions::default());

    let engine = ExecutionEngine::new(Arc::new(HandlerRegistry::with_builtin_handlers()));
    let outcome = engine.run(&ctx).await.unwrap();

    assert_eq!(outcome.status, ExecutionStatus::Failed);
    assert_eq!(outcome.error_type.as_deref(), Some("Deadlock"));

    for id in ["a", "b"] {
        let state = ctx.state.get_node_state(&execution_id, &NodeId::new(id)).unwrap();
        assert_eq!(state.status, Some(ExecutionStatus::Skipped));
    }
}

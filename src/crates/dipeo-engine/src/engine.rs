//! Execution engine: the tick loop driving a diagram to completion
//! (spec §4.7).
//!
//! Each tick asks the [`Scheduler`] for the next ready batch, executes
//! it as one Pregel-style superstep — spawned concurrently, bounded by
//! `concurrency_limit`, with a synchronization barrier at the end of
//! the batch — applies its writes (token production, recorded
//! envelopes), and emits the `NODE_*` events. The loop ends once a
//! tick returns nothing ready and nothing in flight.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tracing::warn;

use crate::diagram::ExecutableNode;
use crate::envelope::Envelope;
use crate::error::{EngineError, Result};
use crate::event::pipeline::EventPipeline;
use crate::event::types::DomainEvent;
use crate::handler::HandlerRegistry;
use crate::ids::NodeId;
use crate::resolver::{relevant_incoming_edges, InputResolver};
use crate::runtime::ExecutionContext;
use crate::scheduler::{Scheduler, SchedulerState, TickOutcome};
use crate::state::ExecutionStatus;
use crate::token::TokenManager;

/// Apply an emitted event to the state manager, logging (never
/// failing) on error (spec §4.2 "Publication failures are logged but
/// never crash the engine" applies equally to state application).
fn apply(context: &ExecutionContext, event: DomainEvent) {
    if let Err(e) = context.state.apply_event(event) {
        warn!(error = %e, "state manager failed to apply event");
    }
}

/// Final outcome of a `run` call, enough to build the execution's
/// terminal status without re-querying the state manager.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub status: ExecutionStatus,
    pub error: Option<String>,
    /// The `error_type` tag carried on `EXECUTION_ERROR` (spec §6,
    /// §8 S5/S6): `"Deadlock"` for a stall, or the failing handler's
    /// `EngineError::error_type()` (e.g. `"Timeout"`, `"Cancelled"`).
    pub error_type: Option<String>,
    /// Last envelope each node produced, so a caller (or a `SubDiagram`
    /// handler reading its child's result) doesn't need to re-derive
    /// output values from the state manager's summarized node states.
    pub outputs: HashMap<NodeId, Envelope>,
}

/// Drives one diagram to completion against a fixed [`ExecutionContext`]
/// and [`HandlerRegistry`] (spec §4.7).
pub struct ExecutionEngine {
    handlers: Arc<HandlerRegistry>,
}

impl ExecutionEngine {
    pub fn new(handlers: Arc<HandlerRegistry>) -> Self {
        Self { handlers }
    }

    pub async fn run(&self, context: &ExecutionContext) -> Result<ExecutionOutcome> {
        let pipeline = EventPipeline::new(
            context.execution_id.clone(),
            context.parent_execution_id.clone(),
            Arc::clone(&context.event_bus),
        );

        let started = pipeline
            .emit_execution_started(context.diagram.name.as_deref(), &context.options.variables)
            .await;
        apply(context, started);

        let resolver = InputResolver::new(&context.diagram);
        let scheduler = Scheduler::new(&context.diagram);
        let mut tokens = TokenManager::new();
        let mut scheduler_state = SchedulerState::default();
        let mut outputs: HashMap<NodeId, Envelope> = HashMap::new();
        let mut maxiter_emitted: HashSet<NodeId> = HashSet::new();

        let outcome = 'tick: loop {
            let ready = scheduler.next_ready_batch(&tokens, &scheduler_state, |id, count| {
                at_max_iteration(&context.diagram, id, count)
            });

            if ready.is_empty() && scheduler_state.in_flight.is_empty() {
                match scheduler.outcome_on_stall(&tokens, &scheduler_state) {
                    TickOutcome::Complete => {
                        break ExecutionOutcome {
                            status: ExecutionStatus::Completed,
                            error: None,
                            error_type: None,
                            outputs: HashMap::new(),
                        };
                    }
                    TickOutcome::Deadlock { stuck_nodes } => {
                        let message = format!(
                            "nodes {:?} never became ready",
                            stuck_nodes.iter().map(|n| n.as_str()).collect::<Vec<_>>()
                        );
                        break ExecutionOutcome {
                            status: ExecutionStatus::Failed,
                            error: Some(message),
                            error_type: Some("Deadlock".to_string()),
                            outputs: HashMap::new(),
                        };
                    }
                    TickOutcome::Continue => unreachable!("stall with no ready batch cannot be Continue"),
                }
            }

            let limit = context.options.concurrency_limit.unwrap_or(ready.len().max(1));
            for batch in ready.chunks(limit) {
                for id in batch {
                    scheduler_state.in_flight.insert(id.clone());
                }

                let futures = batch.iter().map(|id| {
                    let node = context.diagram.node(id).expect("ready node exists").clone();
                    let execution_count = scheduler_state.execution_counts.get(id).copied().unwrap_or(0);
                    self.execute_node(&node, execution_count, context, &resolver, &pipeline, &outputs)
                });

                let results = join_all(futures).await;

                for (id, result) in batch.iter().zip(results) {
                    scheduler_state.in_flight.remove(id);
                    scheduler_state.ran_at_least_once.insert(id.clone());
                    let prior_count = scheduler_state.execution_counts.get(id).copied().unwrap_or(0);
                    let new_count = prior_count + 1;
                    scheduler_state.execution_counts.insert(id.clone(), new_count);

                    match result {
                        Ok(NodeOutcome::Produced { envelope, output_key, node }) => {
                            tokens.produce(&context.diagram, id, &output_key);
                            for edge in relevant_incoming_edges(&context.diagram, &node, prior_count) {
                                tokens.consume(&edge.id);
                            }
                            outputs.insert(id.clone(), envelope);
                        }
                        Err(err) => {
                            if !context.options.continue_on_error {
                                // Fail-fast (spec §4.7 "Propagation"): stop
                                // scheduling new nodes, cancel whatever is
                                // still in flight, and end the execution as
                                // Failed rather than propagating `Err` —
                                // the caller still gets a full
                                // `ExecutionOutcome` with EXECUTION_ERROR
                                // already emitted, matching the Deadlock
                                // path below.
                                context.cancellation.cancel();
                                break 'tick ExecutionOutcome {
                                    status: ExecutionStatus::Failed,
                                    error: Some(err.to_string()),
                                    error_type: Some(err.root_error_type().to_string()),
                                    outputs: HashMap::new(),
                                };
                            }
                        }
                    }

                    if at_max_iteration(&context.diagram, id, new_count) && maxiter_emitted.insert(id.clone()) {
                        if let Some(node) = context.diagram.node(id) {
                            let event = pipeline.emit_node_maxiter_reached(node).await;
                            apply(context, event);
                        }
                    }
                }
            }
        };
        let outcome = ExecutionOutcome { outputs, ..outcome };

        for node in context.diagram.nodes() {
            if !scheduler_state.ran_at_least_once.contains(&node.id) {
                let event = pipeline.emit_node_skipped(node).await;
                apply(context, event);
            }
        }

        match &outcome.status {
            ExecutionStatus::Completed => {
                let event = pipeline.emit_execution_completed("COMPLETED").await;
                apply(context, event);
            }
            ExecutionStatus::Failed => {
                let error_type = outcome.error_type.as_deref().unwrap_or("Deadlock");
                let event = pipeline.emit_execution_error(outcome.error.as_deref().unwrap_or("deadlock"), error_type, None).await;
                apply(context, event);
            }
            _ => {}
        }

        Ok(outcome)
    }

    async fn execute_node(
        &self,
        node: &ExecutableNode,
        execution_count: u32,
        context: &ExecutionContext,
        resolver: &InputResolver<'_>,
        pipeline: &EventPipeline,
        outputs: &HashMap<NodeId, Envelope>,
    ) -> Result<NodeOutcome> {
        let event = pipeline.emit_node_started(node, execution_count).await;
        apply(context, event);

        let conversations = context.conversations.read();
        let reader_person_id = person_id_of(node);
        let inputs = resolver.resolve(node, execution_count, |id| outputs.get(id).cloned(), &conversations, reader_person_id.as_deref());
        drop(conversations);

        let handler = self
            .handlers
            .get(node.kind.tag())
            .ok_or_else(|| EngineError::HandlerValidation { node_id: node.id.to_string(), message: format!("no handler registered for '{}'", node.kind.tag()) })?;

        let started = Instant::now();
        let timeout = Duration::from_secs(context.options.timeout_seconds.max(1));

        let outcome = tokio::select! {
            biased;
            _ = context.cancellation.cancelled() => {
                Err(EngineError::Cancelled { scope: format!("node '{}'", node.id), reason: "execution cancelled".into() })
            }
            result = tokio::time::timeout(timeout, handler.execute(node, inputs, context)) => {
                match result {
                    Ok(inner) => inner,
                    Err(_) => Err(EngineError::Timeout { scope: format!("node '{}'", node.id), elapsed_ms: started.elapsed().as_millis() as u64 }),
                }
            }
        };

        match outcome {
            Ok(envelope) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                let event = pipeline.emit_node_completed(node, &envelope, duration_ms).await;
                apply(context, event);
                let output_key = envelope.output_key.clone().unwrap_or_else(|| "default".to_string());
                Ok(NodeOutcome::Produced { envelope, output_key, node: node.clone() })
            }
            Err(err) => {
                let event = pipeline.emit_node_error(node, &err.to_string(), err.error_type()).await;
                apply(context, event);
                Err(EngineError::handler(node.id.to_string(), execution_count, err))
            }
        }
    }
}

enum NodeOutcome {
    Produced { envelope: Envelope, output_key: String, node: ExecutableNode },
}

fn person_id_of(node: &ExecutableNode) -> Option<String> {
    match &node.kind {
        crate::diagram::NodeKind::PersonJob(params) => Some(params.person_id.as_str().to_string()),
        _ => None,
    }
}

fn at_max_iteration(diagram: &crate::diagram::ExecutableDiagram, id: &NodeId, count: u32) -> bool {
    match diagram.node(id).map(|n| &n.kind) {
        Some(crate::diagram::NodeKind::PersonJob(params)) => count >= params.max_iteration,
        _ => false,
    }
}

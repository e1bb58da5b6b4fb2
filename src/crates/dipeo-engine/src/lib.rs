//! # dipeo-engine
//!
//! The execution core of a diagram-as-program runtime: typed nodes
//! compiled from an authored graph, a token-based scheduler that
//! tolerates cycles, a tick loop that runs ready nodes as Pregel-style
//! supersteps, and an event-sourced state manager fed by a per-execution
//! event pipeline with pluggable observers.
//!
//! ## Core Concepts
//!
//! - **Compilation** ([`diagram`]) — an authored [`diagram::DomainDiagram`]
//!   (open node `data` maps, loosely typed arrows) compiles into an
//!   [`diagram::ExecutableDiagram`] of validated, strongly-typed nodes
//!   and edges. Compilation is the only place untyped input is trusted.
//! - **Scheduling** ([`scheduler`], [`token`]) — readiness is token
//!   presence on incoming edges plus a per-node iteration cap, not
//!   acyclicity; loops (`Condition` back to `PersonJob`) are legal.
//! - **Execution** ([`engine`], [`runtime`], [`resolver`], [`handler`]) —
//!   [`engine::ExecutionEngine`] drives one [`runtime::ExecutionContext`]
//!   to a terminal state, resolving each ready node's inputs and
//!   dispatching to its [`handler::Handler`].
//! - **State & events** ([`state`], [`event`], [`observer`]) — every
//!   transition is an [`event::DomainEvent`] with a monotonic `seq`,
//!   folded into an [`state::ExecutionSnapshot`] and fanned out to
//!   [`observer::Observer`]s.
//! - **Values** ([`envelope`], [`conversation`]) — [`envelope::Envelope`]
//!   is the uniform carrier between nodes; [`conversation::ConversationStore`]
//!   holds per-person LLM history.
//! - **Collaborators** ([`ports`]) — traits the core calls out to
//!   (LLM, HTTP, file, sandbox, interactive prompt, diagram repository);
//!   concrete adapters live outside this crate.
//!
//! ## Running a diagram
//!
//! ```rust,ignore
//! use dipeo_engine::diagram::{compile, DomainDiagram};
//! use dipeo_engine::engine::ExecutionEngine;
//! use dipeo_engine::event::InMemoryEventBus;
//! use dipeo_engine::handler::HandlerRegistry;
//! use dipeo_engine::ids::ExecutionId;
//! use dipeo_engine::runtime::{ExecutionContext, ExecutionOptions, ServiceRegistry};
//! use dipeo_engine::state::StateManager;
//! use std::sync::Arc;
//!
//! # async fn run(source: DomainDiagram) -> dipeo_engine::error::Result<()> {
//! let diagram = Arc::new(compile(&source)?);
//! let context = ExecutionContext::new(
//!     ExecutionId::generate(),
//!     None,
//!     diagram,
//!     ServiceRegistry::new(),
//!     StateManager::new(),
//!     Arc::new(InMemoryEventBus::new()),
//!     Arc::new(ExecutionOptions::default()),
//! );
//! let engine = ExecutionEngine::new(Arc::new(HandlerRegistry::with_builtin_handlers()));
//! engine.run(&context).await?;
//! # Ok(())
//! # }
//! ```

pub mod conversation;
pub mod diagram;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod event;
pub mod handler;
pub mod ids;
pub mod observer;
pub mod ports;
pub mod resolver;
pub mod runtime;
pub mod scheduler;
pub mod state;
pub mod token;

pub use diagram::{compile, decompile, DomainDiagram, ExecutableDiagram};
pub use engine::{ExecutionEngine, ExecutionOutcome};
pub use envelope::Envelope;
pub use error::{EngineError, Result};
pub use event::{DomainEvent, EventBus, InMemoryEventBus};
pub use handler::HandlerRegistry;
pub use ids::{EdgeId, ExecutionId, NodeId, PersonId};
pub use runtime::{ExecutionContext, ExecutionOptions, ServiceRegistry};
pub use state::{ExecutionSnapshot, ExecutionStatus, StateManager};

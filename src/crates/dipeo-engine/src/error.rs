//! Error taxonomy for the execution core.
//!
//! Mirrors the failure classes in the specification: compile errors,
//! scheduling errors, handler errors, cancellation/timeout, and
//! infrastructure errors. Every variant carries enough context for a
//! caller to build the user-visible `EXECUTION_ERROR` / `NODE_ERROR`
//! payloads (`error_message`, `error_type`) without re-deriving them.
//!
//! # Matching on error class
//!
//! ```rust
//! use dipeo_engine::error::EngineError;
//!
//! fn classify(err: &EngineError) -> &'static str {
//!     match err {
//!         EngineError::Compile(_) => "compile",
//!         EngineError::Deadlock { .. } => "scheduling",
//!         EngineError::Handler { .. } => "handler",
//!         EngineError::Cancelled { .. } | EngineError::Timeout { .. } => "cancellation",
//!         _ => "infrastructure",
//!     }
//! }
//! ```

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EngineError>;

/// All failure classes the execution core can produce.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Structural error raised synchronously from [`crate::diagram::compile`].
    ///
    /// Causes: arrow referencing an unknown node, incompatible handle
    /// direction, a node kind's required fields failing validation
    /// (e.g. `PersonJob.max_iteration < 1`).
    #[error("diagram compile error: {0}")]
    Compile(String),

    /// The externally supplied or generated execution id does not match
    /// the `exec_` + 32 lowercase hex chars shape (spec §6).
    #[error("invalid execution id: {0}")]
    InvalidId(String),

    /// No ready nodes and no in-flight tasks remain, but unstarted nodes
    /// still have incoming edges without tokens — the diagram cannot
    /// make further progress.
    #[error("deadlock detected in execution {execution_id}: nodes {stuck_nodes:?} never became ready")]
    Deadlock {
        execution_id: String,
        stuck_nodes: Vec<String>,
    },

    /// A node handler failed. Carries the node id and execution count so
    /// a `NODE_ERROR` event can be built directly from this variant.
    #[error("node '{node_id}' (execution #{execution_count}) failed: {source}")]
    Handler {
        node_id: String,
        execution_count: u32,
        #[source]
        source: Box<EngineError>,
    },

    /// A handler received inputs that fail its declared schema, or is
    /// missing a required service the registry did not inject.
    #[error("handler validation failed for node '{node_id}': {message}")]
    HandlerValidation { node_id: String, message: String },

    /// A required service port was not registered for a handler that
    /// declares it.
    #[error("missing required service '{service}' for handler '{handler}'")]
    MissingService { handler: String, service: String },

    /// Node or execution was cancelled before completing (user abort,
    /// execution timeout cascading to in-flight tasks, or a fatal
    /// observer such as client-disconnect with `cancel_on_disconnect`).
    #[error("{scope} cancelled: {reason}")]
    Cancelled { scope: String, reason: String },

    /// Per-node or per-execution wall-clock timeout elapsed.
    #[error("{scope} timed out after {elapsed_ms}ms")]
    Timeout { scope: String, elapsed_ms: u64 },

    /// The event bus, state store, or a durable backend is unavailable.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),

    /// JSON (de)serialization failure at a port boundary.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Catch-all for collaborator (LLM/HTTP/file/sandbox) port errors
    /// that do not need a dedicated variant.
    #[error("{0}")]
    Port(String),
}

impl EngineError {
    /// The `error_type` string carried on `NODE_ERROR` / `EXECUTION_ERROR`
    /// events (spec §6, §8 S5/S6): a short, stable, PascalCase tag.
    pub fn error_type(&self) -> &'static str {
        match self {
            EngineError::Compile(_) => "CompileError",
            EngineError::InvalidId(_) => "InvalidId",
            EngineError::Deadlock { .. } => "Deadlock",
            EngineError::Handler { .. } => "HandlerError",
            EngineError::HandlerValidation { .. } => "ValidationError",
            EngineError::MissingService { .. } => "MissingService",
            EngineError::Cancelled { .. } => "Cancelled",
            EngineError::Timeout { .. } => "Timeout",
            EngineError::Infrastructure(_) => "Infrastructure",
            EngineError::Serde(_) => "Serialization",
            EngineError::Port(_) => "PortError",
        }
    }

    /// Like [`error_type`](Self::error_type), but unwraps a `Handler`
    /// wrapper first so the execution-level `EXECUTION_ERROR` reports
    /// the underlying cause (e.g. `"Timeout"`) rather than the generic
    /// `"HandlerError"` the wrapper itself would report.
    pub fn root_error_type(&self) -> &'static str {
        match self {
            EngineError::Handler { source, .. } => source.root_error_type(),
            other => other.error_type(),
        }
    }

    pub fn handler(node_id: impl Into<String>, execution_count: u32, source: EngineError) -> Self {
        EngineError::Handler {
            node_id: node_id.into(),
            execution_count,
            source: Box::new(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_type_is_stable_for_matching() {
        let err = EngineError::Timeout { scope: "execution".into(), elapsed_ms: 5000 };
        assert_eq!(err.error_type(), "Timeout");
    }

    #[test]
    fn handler_error_wraps_source() {
        let inner = EngineError::Port("llm unavailable".into());
        let wrapped = EngineError::handler("n1", 2, inner);
        assert!(wrapped.to_string().contains("n1"));
        assert!(wrapped.to_string().contains("execution #2"));
    }
}

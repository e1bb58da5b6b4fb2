//! The uniform value carrier between nodes (spec §3 "Envelope", §4.11).
//!
//! An envelope holds a natural `body` plus optional alternate
//! `representations` so one production can satisfy heterogeneous
//! consumers (a downstream code node wants `text`, a judge node wants
//! `conversation`) without recomputation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::conversation::ConversationView;
use crate::error::{EngineError, Result};

/// The kind of alternate representation a consumer can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepresentationKind {
    Text,
    Object,
    Conversation,
}

/// Token accounting reported by an LLM call, carried on envelope
/// metadata and surfaced on `NODE_COMPLETED` events (spec §6 example
/// payload `token_usage`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u32,
    pub output: u32,
    #[serde(default)]
    pub cached: u32,
}

/// Envelope metadata: who produced it, with what model, and a summary
/// for display/event purposes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvelopeMeta {
    pub person_id: Option<String>,
    pub model: Option<String>,
    pub token_usage: Option<TokenUsage>,
    pub memory_selection: Option<String>,
    pub output_summary: Option<String>,
    pub trace: Option<Value>,
}

/// An alternate representation of an envelope's body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Representation {
    Text(String),
    Object(Value),
    Conversation(ConversationView),
}

/// A node's immutable output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub body: Value,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    representations: HashMap<RepresentationKind, Representation>,
    pub meta: EnvelopeMeta,
    /// Which of a node's output handles this production tokens (spec
    /// §4.5 "Condition output"). `None` means the engine routes it
    /// through the node's sole `default` handle; this is a routing
    /// signal for `TokenManager::produce`, distinct from
    /// `meta.output_summary`'s display text.
    #[serde(default)]
    pub output_key: Option<String>,
}

impl Envelope {
    pub fn new(body: Value) -> Self {
        Self { body, representations: HashMap::new(), meta: EnvelopeMeta::default(), output_key: None }
    }

    pub fn with_meta(mut self, meta: EnvelopeMeta) -> Self {
        self.meta = meta;
        self
    }

    pub fn with_output_key(mut self, output_key: impl Into<String>) -> Self {
        self.output_key = Some(output_key.into());
        self
    }

    pub fn with_representation(mut self, kind: RepresentationKind, value: Representation) -> Self {
        self.representations.insert(kind, value);
        self
    }

    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.with_representation(RepresentationKind::Text, Representation::Text(text.into()))
    }

    pub fn with_conversation(self, view: ConversationView) -> Self {
        self.with_representation(RepresentationKind::Conversation, Representation::Conversation(view))
    }

    /// Request a representation, synthesizing one from `body` when the
    /// exact kind was never produced (spec §4.11: "requesting a
    /// non-existent representation yields a synthesized one from `body`
    /// when possible, else an error").
    pub fn representation(&self, kind: RepresentationKind) -> Result<Representation> {
        if let Some(repr) = self.representations.get(&kind) {
            return Ok(repr.clone());
        }
        match kind {
            RepresentationKind::Text => Ok(Representation::Text(value_as_text(&self.body))),
            RepresentationKind::Object => match &self.body {
                Value::Object(_) | Value::Array(_) => Ok(Representation::Object(self.body.clone())),
                other => Err(EngineError::Port(format!(
                    "cannot synthesize object representation from body {other}"
                ))),
            },
            RepresentationKind::Conversation => Err(EngineError::Port(
                "no conversation representation available and none can be synthesized".into(),
            )),
        }
    }

    pub fn text(&self) -> String {
        match self.representation(RepresentationKind::Text) {
            Ok(Representation::Text(t)) => t,
            _ => value_as_text(&self.body),
        }
    }
}

fn value_as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

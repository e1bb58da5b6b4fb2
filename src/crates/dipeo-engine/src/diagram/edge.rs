//! Executable edges and transform rules (spec §3 "Executable edge").

use serde::{Deserialize, Serialize};

use crate::ids::{EdgeId, NodeId};

/// How an edge's content should be presented to its target input
/// (spec §4.8 "Select representation by `transform_rules.content_type`").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    RawText,
    Object,
    ConversationState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformRules {
    pub content_type: ContentType,
    /// When set, the resolved value is bound under this name instead of
    /// the edge's raw `target_input_key` (spec §4.8 step 3).
    pub label: Option<String>,
}

impl TransformRules {
    pub fn new(content_type: ContentType) -> Self {
        Self { content_type, label: None }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// The `first`/`default` distinction a `PersonJob`'s incoming edges may
/// carry (spec §4.5 readiness predicate #2, §4.8 step 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeRole {
    Default,
    First,
}

impl Default for EdgeRole {
    fn default() -> Self {
        EdgeRole::Default
    }
}

/// A resolved connection between two node handles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutableEdge {
    pub id: EdgeId,
    pub source_node_id: NodeId,
    pub source_output_key: String,
    pub target_node_id: NodeId,
    pub target_input_key: String,
    pub transform_rules: TransformRules,
    #[serde(default)]
    pub role: EdgeRole,
}

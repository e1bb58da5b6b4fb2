//! The authored (pre-compile) diagram shape: open maps, handle strings.
//!
//! This is the wire/storage format a `DiagramRepositoryPort` loads;
//! [`crate::diagram::compile`] turns it into an [`ExecutableDiagram`]
//! (spec §4.1).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::edge::ContentType;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthoredNode {
    pub id: String,
    pub kind: String,
    #[serde(default)]
    pub label: Option<String>,
    /// Open map; [`super::compile`] validates and converts this per
    /// `kind` into a typed [`super::node::NodeKind`] parameter record.
    #[serde(default)]
    pub data: Value,
}

/// `node_id:handle_label:direction`, e.g. `n1:default:output`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthoredArrow {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub content_type: Option<ContentType>,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiagramMetadata {
    pub name: Option<String>,
}

/// The raw, author-facing diagram: nodes and arrows as lists (or maps,
/// normalized to lists by the compiler's step 1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainDiagram {
    pub nodes: Vec<AuthoredNode>,
    pub arrows: Vec<AuthoredArrow>,
    #[serde(default)]
    pub metadata: DiagramMetadata,
}

/// The parsed `node_id:handle_label:direction` handle components
/// (spec §4.1 step 3).
pub struct Handle {
    pub node_id: String,
    pub handle_label: String,
    pub direction: HandleDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleDirection {
    Input,
    Output,
}

impl Handle {
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.splitn(3, ':');
        let node_id = parts.next()?.to_string();
        let handle_label = parts.next()?.to_string();
        let direction = match parts.next()? {
            "input" => HandleDirection::Input,
            "output" => HandleDirection::Output,
            _ => return None,
        };
        Some(Self { node_id, handle_label, direction })
    }
}

//! Typed nodes (spec §3 "Typed node", §4.1).
//!
//! The compiler turns an authored diagram's open `data` maps into this
//! tagged union. Each variant's parameter record is validated once,
//! at compile time, so every downstream component — scheduler,
//! resolver, handlers — may assume structural validity.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{NodeId, PersonId};

/// Criteria governing which conversation messages a `PersonJob`
/// includes before calling its model (spec §4.10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorizeTo {
    pub criteria: String,
    pub at_most: Option<u32>,
    #[serde(default)]
    pub ignore_person: Vec<PersonId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonJobParams {
    pub person_id: PersonId,
    pub default_prompt: String,
    pub first_only_prompt: Option<String>,
    pub max_iteration: u32,
    pub memorize_to: Option<MemorizeTo>,
    pub text_format: Option<Value>,
    #[serde(default)]
    pub tools: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndParams {
    pub output_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeJobParams {
    pub language: String,
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiJobParams {
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub headers: Value,
    pub body: Option<Value>,
    pub timeout_seconds: Option<u64>,
}

/// The strategy a `Condition` node uses to produce its boolean body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "condition_type", rename_all = "snake_case")]
pub enum ConditionStrategy {
    Expression { expression: String },
    LlmDecision { person_id: PersonId, prompt: String },
    DetectMaxIterations { target_node_id: NodeId },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionParams {
    #[serde(flatten)]
    pub strategy: ConditionStrategy,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DbOperation {
    Read,
    Write,
    Append,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbParams {
    pub operation: DbOperation,
    pub file: String,
    #[serde(default)]
    pub serialize_json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateJobParams {
    pub template: String,
    pub output_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubDiagramParams {
    pub diagram_name: String,
    #[serde(default)]
    pub batch: bool,
    #[serde(default)]
    pub batch_parallel: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponseParams {
    pub prompt_text: String,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HookKind {
    Shell,
    Webhook,
    Python,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookParams {
    pub kind: HookKind,
    pub command: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonSchemaValidatorParams {
    pub schema: Value,
    #[serde(default)]
    pub strict: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypescriptAstParams {
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegratedApiParams {
    pub provider: String,
    pub operation: String,
    #[serde(default)]
    pub config: Value,
}

/// A validated, strongly-typed node (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum NodeKind {
    Start,
    End(EndParams),
    PersonJob(PersonJobParams),
    CodeJob(CodeJobParams),
    ApiJob(ApiJobParams),
    Condition(ConditionParams),
    Db(DbParams),
    TemplateJob(TemplateJobParams),
    SubDiagram(SubDiagramParams),
    UserResponse(UserResponseParams),
    Hook(HookParams),
    JsonSchemaValidator(JsonSchemaValidatorParams),
    TypescriptAst(TypescriptAstParams),
    IntegratedApi(IntegratedApiParams),
}

impl NodeKind {
    /// Short PascalCase tag, used for discovery-order tie-breaking in
    /// the compiler's cyclic topological sort (spec §4.1 step 5).
    pub fn tag(&self) -> &'static str {
        match self {
            NodeKind::Start => "Start",
            NodeKind::End(_) => "End",
            NodeKind::PersonJob(_) => "PersonJob",
            NodeKind::CodeJob(_) => "CodeJob",
            NodeKind::ApiJob(_) => "ApiJob",
            NodeKind::Condition(_) => "Condition",
            NodeKind::Db(_) => "Db",
            NodeKind::TemplateJob(_) => "TemplateJob",
            NodeKind::SubDiagram(_) => "SubDiagram",
            NodeKind::UserResponse(_) => "UserResponse",
            NodeKind::Hook(_) => "Hook",
            NodeKind::JsonSchemaValidator(_) => "JsonSchemaValidator",
            NodeKind::TypescriptAst(_) => "TypescriptAst",
            NodeKind::IntegratedApi(_) => "IntegratedApi",
        }
    }

    /// Priority used to order cyclic components (spec §4.1 step 5:
    /// "Start nodes first, then PersonJob, then others, in discovery
    /// order").
    pub(super) fn cycle_priority(&self) -> u8 {
        match self {
            NodeKind::Start => 0,
            NodeKind::PersonJob(_) => 1,
            _ => 2,
        }
    }
}

/// A node plus its stable identity and authoring metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutableNode {
    pub id: NodeId,
    pub label: String,
    pub kind: NodeKind,
}

impl ExecutableNode {
    pub fn new(id: NodeId, label: impl Into<String>, kind: NodeKind) -> Self {
        Self { id, label: label.into(), kind }
    }
}

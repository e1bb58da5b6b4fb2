//! External collaborator contracts (spec §6 "Ports (dependencies
//! consumed)"). The execution core is generic over these; concrete
//! adapters (a real LLM client, a sandboxed subprocess runner, ...)
//! live outside this crate.

use async_trait::async_trait;
use serde_json::Value;

use crate::conversation::ViewedMessage;
use crate::envelope::TokenUsage;
use crate::error::Result;
use crate::event::DomainEvent;
use crate::ids::ExecutionId;

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ViewedMessage>,
    pub model: String,
    pub api_key_id: String,
    pub tools: Vec<String>,
    pub text_format: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub text: String,
    pub raw: Value,
    pub token_usage: TokenUsage,
    pub tool_outputs: Option<Value>,
}

#[async_trait]
pub trait LlmServicePort: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;
}

#[async_trait]
pub trait FileServicePort: Send + Sync {
    async fn read(&self, path: &str) -> Result<String>;
    async fn write(&self, path: &str, content: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: Value,
    pub body: Option<Value>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Value,
}

#[async_trait]
pub trait HttpServicePort: Send + Sync {
    async fn request(&self, request: HttpRequest) -> Result<HttpResponse>;
}

#[derive(Debug, Clone)]
pub struct SandboxResult {
    pub return_value: Option<Value>,
    pub stdout: String,
    pub stderr: String,
}

#[async_trait]
pub trait SandboxPort: Send + Sync {
    async fn execute(&self, language: &str, code: &str, inputs: &Value) -> Result<SandboxResult>;
}

#[async_trait]
pub trait InteractiveHandlerPort: Send + Sync {
    /// `Ok(None)` signals the prompt timed out without a response.
    async fn prompt(&self, node_id: &str, prompt_text: &str, timeout_seconds: Option<u64>) -> Result<Option<String>>;
}

#[async_trait]
pub trait MessageRouterPort: Send + Sync {
    async fn publish(&self, execution_id: &ExecutionId, event: &DomainEvent);
    async fn broadcast(&self, event: &DomainEvent);
}

#[async_trait]
pub trait DiagramRepositoryPort: Send + Sync {
    async fn load(&self, name_or_id: &str) -> Result<crate::diagram::DomainDiagram>;
}

#[async_trait]
pub trait ApiKeyPort: Send + Sync {
    async fn get(&self, id: &str) -> Result<String>;
    async fn list(&self) -> Result<Vec<String>>;
}

/// Resolves a `PersonJob`'s conversation partners into a message view,
/// the collaborator a handler asks instead of touching
/// [`crate::conversation::ConversationStore`] directly — kept as a
/// trait so handler tests can stub it (spec §4.9 PersonJob behavior).
pub trait MemorySelector: Send + Sync {
    fn select(&self, messages: Vec<ViewedMessage>, criteria: &str, at_most: Option<u32>) -> Vec<ViewedMessage>;
}

/// Deterministic substring-match selector (spec §9 Open Questions:
/// "either [LLM-scored or substring] is acceptable so long as it is
/// deterministic given the same inputs").
pub struct SubstringMemorySelector;

impl MemorySelector for SubstringMemorySelector {
    fn select(&self, messages: Vec<ViewedMessage>, criteria: &str, at_most: Option<u32>) -> Vec<ViewedMessage> {
        let filtered: Vec<ViewedMessage> = if criteria.is_empty() {
            messages
        } else {
            messages.into_iter().filter(|m| m.content.contains(criteria)).collect()
        };
        match at_most {
            Some(n) => {
                let n = n as usize;
                let start = filtered.len().saturating_sub(n);
                filtered[start..].to_vec()
            }
            None => filtered,
        }
    }
}

use crate::context::RunContext;
use async_trait::async_trait;
use serde_json::Value;

/// One tool invocation requested by the model. Multiple calls per turn are
/// permitted; `id` is the opaque correlation handle pairing results back.
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: Value,
    /// Raw JSON as received from the wire, when the provider preserves it.
    pub input_json: Option<String>,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input,
            input_json: None,
        }
    }
}

/// Result of one tool invocation, paired by `tool_id`.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub tool_id: String,
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn ok(tool_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_id: tool_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(tool_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_id: tool_id.into(),
            content: content.into(),
            is_error: true,
        }
    }
}

impl std::fmt::Display for ToolResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.content)
    }
}

/// Static description of a registered tool.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool input.
    pub parameters: Value,
}

/// Tool execution boundary consumed by the engine. Implementations own the
/// concrete tools; the engine only dispatches and collects results.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, ctx: &RunContext, call: &ToolCall) -> anyhow::Result<String>;

    fn list_tools(&self) -> Vec<String>;

    fn get_tool(&self, name: &str) -> Option<ToolDescriptor>;

    fn validate_input(&self, name: &str, input: &Value) -> anyhow::Result<()>;
}

use crate::context::RunContext;
use crate::tools::{ToolCall, ToolResult};
use async_trait::async_trait;

/// Extended-thinking configuration for a session.
///
/// `budget_tokens == 0` means "inherit from the next level down" when the
/// engine resolves the effective value. `show_thinking` controls display
/// only and is never agent-configurable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ThinkingInfo {
    pub enabled: bool,
    pub budget_tokens: u32,
    pub show_thinking: bool,
}

/// A single conversation message as the engine sees it.
#[derive(Debug, Clone, Default)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".into(),
            content: content.into(),
        }
    }
}

/// One assistant response: the message plus any tool calls requested in it.
#[derive(Debug, Clone, Default)]
pub struct AssistantTurn {
    pub message: Message,
    pub tool_calls: Vec<ToolCall>,
}

/// Conversation store boundary consumed by the engine.
///
/// The engine opens one session per run, serializes all writes for that
/// session through its turn loop, and guarantees `end_conversation` is
/// called exactly once per opened session on every exit path.
#[async_trait]
pub trait ConversationService: Send + Sync {
    async fn start_conversation(&self, ctx: &RunContext) -> anyhow::Result<String>;

    async fn add_user_message(
        &self,
        ctx: &RunContext,
        session_id: &str,
        content: &str,
    ) -> anyhow::Result<Message>;

    /// Ask the model for the next assistant turn. Tool calls are returned in
    /// the order the model requested them.
    async fn process_assistant_response(
        &self,
        ctx: &RunContext,
        session_id: &str,
    ) -> anyhow::Result<AssistantTurn>;

    /// Record one batch of tool results, preserving request order.
    async fn add_tool_results(
        &self,
        ctx: &RunContext,
        session_id: &str,
        results: &[ToolResult],
    ) -> anyhow::Result<()>;

    async fn end_conversation(&self, session_id: &str) -> anyhow::Result<()>;

    async fn set_system_prompt(
        &self,
        ctx: &RunContext,
        session_id: &str,
        content: &str,
    ) -> anyhow::Result<()>;

    fn set_thinking_mode(&self, session_id: &str, info: ThinkingInfo) -> anyhow::Result<()>;

    fn get_thinking_mode(&self, session_id: &str) -> ThinkingInfo;
}

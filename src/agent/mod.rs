pub mod runner;
pub mod subagent;
pub mod warnings;

use crate::context::RunContext;
use async_trait::async_trait;
use std::time::Duration;

/// Where an agent spec came from. Registry specs are discovered by name;
/// dynamic specs are constructed programmatically by the caller. Both feed
/// the same engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AgentSource {
    #[default]
    Registry,
    Dynamic,
}

/// Configuration of an agent role. Constructed by a registry loader or via
/// [`AgentSpec::dynamic`], never mutated afterwards.
#[derive(Debug, Clone, Default)]
pub struct AgentSpec {
    /// Unique per registry, non-empty.
    pub name: String,
    pub description: String,
    pub raw_system_prompt: String,
    /// Shorthand (`haiku`/`sonnet`/`opus`/`inherit`) or a full model id;
    /// empty means inherit.
    pub model: String,
    /// 0 means use the engine default.
    pub max_actions: u32,
    /// `None` allows all tools; an empty list blocks all of them.
    pub allowed_tools: Option<Vec<String>>,
    /// Tri-state: unset inherits from context/config, `Some(false)` wins
    /// over both.
    pub thinking_enabled: Option<bool>,
    /// Thinking token budget; 0 means inherit.
    pub thinking_budget: u32,
    pub source: AgentSource,
}

impl AgentSpec {
    /// Programmatically constructed spec, bypassing the registry.
    pub fn dynamic(
        name: impl Into<String>,
        system_prompt: impl Into<String>,
        model: impl Into<String>,
        max_actions: u32,
        allowed_tools: Option<Vec<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            raw_system_prompt: system_prompt.into(),
            model: model.into(),
            max_actions,
            allowed_tools,
            source: AgentSource::Dynamic,
            ..Self::default()
        }
    }
}

/// Terminal status of one engine run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    Failed,
    Cancelled,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Terminal value of one [`runner::AgentRunner`] session.
#[derive(Debug, Clone)]
pub struct AgentRunResult {
    pub subagent_id: String,
    pub agent_name: String,
    pub status: RunStatus,
    /// Final assistant message, prefixed `[SUBAGENT: <name>]\n\n`.
    pub output: String,
    /// Counts only tools that reached the executor.
    pub actions_taken: u32,
    /// Executor-level failures observed during the run.
    pub tool_errors: u32,
    pub duration: Duration,
    pub error: Option<String>,
}

/// Agent discovery boundary consumed by the supervisor.
#[async_trait]
pub trait AgentRegistry: Send + Sync {
    /// Load an agent spec by name. Missing agents surface as
    /// [`crate::errors::SleuthError::AgentNotFound`].
    async fn load_agent(&self, ctx: &RunContext, name: &str)
    -> crate::errors::SleuthResult<AgentSpec>;

    async fn list_agents(&self, ctx: &RunContext) -> crate::errors::SleuthResult<Vec<String>>;
}

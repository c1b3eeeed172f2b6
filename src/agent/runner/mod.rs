use crate::agent::warnings::TurnWarningFormatter;
use crate::agent::{AgentRunResult, AgentSpec, RunStatus};
use crate::config::EngineConfig;
use crate::context::RunContext;
use crate::convo::{ConversationService, ThinkingInfo};
use crate::errors::SleuthError;
use crate::provider::{ModelProvider, ModelScope, resolve_model};
use crate::safety::SafetyEnforcer;
use crate::tools::{ToolCall, ToolExecutor, ToolResult};
use crate::ui::StatusSink;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Tool names treated as shell-style: their `command` input is matched
/// against the blocked-command fragments.
const SHELL_TOOLS: &[&str] = &["bash", "shell", "exec"];

/// Drives one bounded agent session to completion.
///
/// The turn loop is strictly sequential within a session: one AI call, tool
/// calls executed one-by-one in request order, one batched tool-result
/// message, then the next AI call. Distinct sessions run concurrently on
/// separate runner invocations.
pub struct AgentRunner {
    convo: Arc<dyn ConversationService>,
    provider: Arc<dyn ModelProvider>,
    tools: Arc<dyn ToolExecutor>,
    ui: Option<Arc<dyn StatusSink>>,
    config: EngineConfig,
}

impl AgentRunner {
    pub fn new(
        convo: Arc<dyn ConversationService>,
        provider: Arc<dyn ModelProvider>,
        tools: Arc<dyn ToolExecutor>,
        ui: Option<Arc<dyn StatusSink>>,
        config: EngineConfig,
    ) -> Self {
        Self {
            convo,
            provider,
            tools,
            ui,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run one agent session to completion.
    ///
    /// Guarantees, on every exit path: the conversation session (if opened)
    /// is ended exactly once, and a scoped model switch (if made) is
    /// restored exactly once. A pre-cancelled context fails fast without
    /// opening a session.
    pub async fn run(
        &self,
        ctx: &RunContext,
        agent: &AgentSpec,
        task_prompt: &str,
        subagent_id: &str,
    ) -> Result<AgentRunResult, SleuthError> {
        let started = Instant::now();

        if agent.name.is_empty() {
            return Err(SleuthError::InvalidInput(
                "agent name must not be empty".into(),
            ));
        }
        if task_prompt.is_empty() {
            return Err(SleuthError::InvalidInput(
                "task prompt must not be empty".into(),
            ));
        }
        ctx.check()?;

        // Restored on drop, success or failure.
        let _model_scope = resolve_model(&agent.model)
            .map(|target| ModelScope::switch(self.provider.clone(), target));

        // Downstream tool dispatch consults this marker for the recursion
        // guard.
        let ctx = ctx.with_subagent(subagent_id, None);

        let session = self
            .convo
            .start_conversation(&ctx)
            .await
            .map_err(|e| conversation_error(&ctx, "failed to start session", &e))?;
        info!(
            "[{}] session {} opened for agent '{}'",
            subagent_id, session, agent.name
        );

        let outcome = self
            .drive_session(&ctx, agent, task_prompt, subagent_id, &session, started)
            .await;

        if let Err(e) = self.convo.end_conversation(&session).await {
            warn!("[{}] failed to end session {}: {}", subagent_id, session, e);
        }
        outcome
    }

    async fn drive_session(
        &self,
        ctx: &RunContext,
        agent: &AgentSpec,
        task_prompt: &str,
        subagent_id: &str,
        session: &str,
        started: Instant,
    ) -> Result<AgentRunResult, SleuthError> {
        let max_actions = if agent.max_actions > 0 {
            agent.max_actions
        } else {
            self.config.default_max_actions
        };
        let safety = SafetyEnforcer::new(
            agent.allowed_tools.clone(),
            Vec::new(),
            self.config.blocked_commands.clone(),
            max_actions,
        );
        let warnings = TurnWarningFormatter::new(
            self.config.warning_threshold,
            self.config.batch_tool_hint.clone(),
        );

        if let Some(info) = self.resolve_thinking(ctx, agent) {
            debug!(
                "[{}] thinking enabled (budget: {} tokens)",
                subagent_id, info.budget_tokens
            );
            if let Err(e) = self.convo.set_thinking_mode(session, info) {
                warn!("[{}] failed to install thinking mode: {}", subagent_id, e);
            }
        }

        self.convo
            .set_system_prompt(ctx, session, &agent.raw_system_prompt)
            .await
            .map_err(|e| conversation_error(ctx, "failed to set system prompt", &e))?;
        self.convo
            .add_user_message(ctx, session, task_prompt)
            .await
            .map_err(|e| conversation_error(ctx, "failed to add task prompt", &e))?;

        let mut actions: u32 = 0;
        let mut tool_errors: u32 = 0;
        let mut last_message = String::new();

        while actions < max_actions {
            ctx.check()?;

            // Recomputed every iteration so external mutations to the
            // session's thinking configuration between turns are honored.
            let thinking = self.convo.get_thinking_mode(session);
            if thinking.enabled {
                self.display(agent, "thinking", "");
            }

            let turn = self
                .convo
                .process_assistant_response(ctx, session)
                .await
                .map_err(|e| conversation_error(ctx, "assistant response failed", &e))?;
            last_message = turn.message.content;

            if turn.tool_calls.is_empty() {
                break;
            }

            let mut results = Vec::with_capacity(turn.tool_calls.len());
            for call in &turn.tool_calls {
                if let Some(denial) = self.deny_reason(ctx, &safety, actions, call) {
                    debug!("[{}] tool '{}' denied: {}", subagent_id, call.name, denial);
                    results.push(ToolResult::error(&call.id, denial));
                    continue;
                }
                safety.check_timeout(ctx)?;

                if let Err(e) = self.tools.validate_input(&call.name, &call.input) {
                    debug!(
                        "[{}] tool '{}' input validation failed: {}",
                        subagent_id, call.name, e
                    );
                    results.push(ToolResult::error(
                        &call.id,
                        format!("invalid input for tool '{}': {}", call.name, e),
                    ));
                    continue;
                }

                self.display(agent, "executing", &call.name);
                match self.tools.execute(ctx, call).await {
                    Ok(output) => {
                        results.push(ToolResult::ok(&call.id, output));
                        self.display(agent, "tool completed", &call.name);
                    }
                    Err(e) => {
                        warn!("[{}] tool '{}' failed: {}", subagent_id, call.name, e);
                        results.push(ToolResult::error(
                            &call.id,
                            format!("Tool execution failed: {}", e),
                        ));
                        tool_errors += 1;
                        self.display(agent, "tool failed", &call.name);
                    }
                }
                actions += 1;
            }

            self.convo
                .add_tool_results(ctx, session, &results)
                .await
                .map_err(|e| conversation_error(ctx, "failed to record tool results", &e))?;

            let remaining = max_actions - actions;
            if let Some(warning) = warnings.format(remaining) {
                if let Err(e) = self.convo.add_user_message(ctx, session, &warning).await {
                    warn!("[{}] failed to inject turn warning: {}", subagent_id, e);
                }
            }
        }

        let duration = started.elapsed();
        info!(
            "[{}] agent '{}' completed: {} action(s), {} tool error(s) in {:?}",
            subagent_id, agent.name, actions, tool_errors, duration
        );
        Ok(AgentRunResult {
            subagent_id: subagent_id.to_string(),
            agent_name: agent.name.clone(),
            status: RunStatus::Completed,
            output: format!("[SUBAGENT: {}]\n\n{}", agent.name, last_message),
            actions_taken: actions,
            tool_errors,
            duration,
            error: None,
        })
    }

    /// Policy gate for one tool dispatch. A `Some` denial is fed back to the
    /// model as an error result and does not consume budget.
    ///
    /// Order: allowlist, delegation recursion guard, command pattern, budget.
    fn deny_reason(
        &self,
        ctx: &RunContext,
        safety: &SafetyEnforcer,
        current_actions: u32,
        call: &ToolCall,
    ) -> Option<String> {
        if let Err(e) = safety.check_tool_allowed(&call.name) {
            return Some(e.to_string());
        }
        if ctx.is_subagent() && self.is_delegation_tool(&call.name) {
            return Some(format!(
                "tool '{}' is blocked in subagent context; delegation cannot be nested",
                call.name
            ));
        }
        if let Some(command) = shell_command(call) {
            if let Err(e) = safety.check_command_allowed(command) {
                return Some(e.to_string());
            }
        }
        if let Err(e) = safety.check_action_budget(current_actions) {
            return Some(e.to_string());
        }
        None
    }

    fn is_delegation_tool(&self, name: &str) -> bool {
        self.config.delegation_tools.iter().any(|t| t == name)
    }

    /// Effective thinking mode: agent-level setting wins, then the context
    /// override, then static config. An explicit agent-level disable is
    /// final; context and config may not re-enable it. `show_thinking` is
    /// never agent-configurable.
    fn resolve_thinking(&self, ctx: &RunContext, agent: &AgentSpec) -> Option<ThinkingInfo> {
        match agent.thinking_enabled {
            Some(false) => None,
            Some(true) => {
                let ambient = ctx
                    .thinking()
                    .unwrap_or_else(|| self.config.thinking.as_info());
                let budget_tokens = if agent.thinking_budget > 0 {
                    agent.thinking_budget
                } else {
                    ambient.budget_tokens
                };
                Some(ThinkingInfo {
                    enabled: true,
                    budget_tokens,
                    show_thinking: ambient.show_thinking,
                })
            }
            None => {
                if let Some(from_ctx) = ctx.thinking() {
                    return from_ctx.enabled.then_some(from_ctx);
                }
                let from_config = self.config.thinking.as_info();
                from_config.enabled.then_some(from_config)
            }
        }
    }

    fn display(&self, agent: &AgentSpec, status: &str, details: &str) {
        if let Some(ui) = &self.ui {
            ui.subagent_status(&agent.name, status, details);
        }
    }
}

/// Classify a conversation-service failure. Cancellation observed on the
/// context takes precedence, so cancelled runs report as cancelled even
/// when the store surfaces its own error.
fn conversation_error(ctx: &RunContext, what: &str, cause: &anyhow::Error) -> SleuthError {
    if let Err(cancelled) = ctx.check() {
        return cancelled;
    }
    SleuthError::Conversation(format!("{}: {}", what, cause))
}

fn shell_command(call: &ToolCall) -> Option<&str> {
    if !SHELL_TOOLS.contains(&call.name.as_str()) {
        return None;
    }
    call.input.get("command").and_then(Value::as_str)
}

use crate::context::RunContext;
use crate::errors::SleuthError;

/// Pure policy gate for tool dispatch. Configuration is immutable after
/// construction, so checks are plain functions of (config, input) and can be
/// called without synchronization.
///
/// Gate ordering for a single dispatch: tool-name allowlist → command-pattern
/// (shell-style tools only) → action budget → deadline.
#[derive(Debug, Clone, Default)]
pub struct SafetyEnforcer {
    /// `None` allows all tools (the blocklist still applies); an empty list
    /// blocks every tool.
    allowed_tools: Option<Vec<String>>,
    blocked_tools: Vec<String>,
    /// Command fragments matched as prefixes of the trimmed command.
    blocked_commands: Vec<String>,
    max_actions: u32,
}

impl SafetyEnforcer {
    pub fn new(
        allowed_tools: Option<Vec<String>>,
        blocked_tools: Vec<String>,
        blocked_commands: Vec<String>,
        max_actions: u32,
    ) -> Self {
        Self {
            allowed_tools,
            blocked_tools,
            blocked_commands,
            max_actions,
        }
    }

    /// Enforcer that permits everything. Used when safety checks are
    /// disabled by configuration.
    pub fn permissive(max_actions: u32) -> Self {
        Self {
            allowed_tools: None,
            blocked_tools: Vec::new(),
            blocked_commands: Vec::new(),
            max_actions,
        }
    }

    pub fn max_actions(&self) -> u32 {
        self.max_actions
    }

    /// If an allowlist is configured, membership is required; otherwise the
    /// blocklist is consulted.
    pub fn check_tool_allowed(&self, name: &str) -> Result<(), SleuthError> {
        if let Some(allowed) = &self.allowed_tools {
            if !allowed.iter().any(|t| t == name) {
                return Err(SleuthError::ToolNotAllowed { tool: name.into() });
            }
            return Ok(());
        }
        if self.blocked_tools.iter().any(|t| t == name) {
            return Err(SleuthError::ToolNotAllowed { tool: name.into() });
        }
        Ok(())
    }

    /// Match the command against the configured blocked fragments
    /// (e.g. `"rm -rf"`) by prefix of the trimmed command.
    pub fn check_command_allowed(&self, command: &str) -> Result<(), SleuthError> {
        let trimmed = command.trim_start();
        for fragment in &self.blocked_commands {
            if !fragment.is_empty() && trimmed.starts_with(fragment.as_str()) {
                return Err(SleuthError::CommandBlocked {
                    command: command.into(),
                });
            }
        }
        Ok(())
    }

    pub fn check_action_budget(&self, current: u32) -> Result<(), SleuthError> {
        if current >= self.max_actions {
            return Err(SleuthError::ActionBudgetExceeded {
                max: self.max_actions,
            });
        }
        Ok(())
    }

    /// Fails when the ambient deadline has elapsed or the context is
    /// cancelled.
    pub fn check_timeout(&self, ctx: &RunContext) -> Result<(), SleuthError> {
        ctx.check()
    }
}

#[cfg(test)]
mod tests;

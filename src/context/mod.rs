use crate::convo::ThinkingInfo;
use crate::errors::SleuthError;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Per-context marker for sessions running under task delegation.
///
/// Carries a depth counter for diagnostics even though only depth > 0 is
/// policy-relevant.
#[derive(Debug, Clone, Default)]
pub struct SubagentInfo {
    pub subagent_id: String,
    pub parent_session_id: Option<String>,
    pub depth: usize,
    pub is_subagent: bool,
}

/// Cancellation-aware call context threaded through every engine operation.
///
/// Bundles a cooperative [`CancellationToken`], an optional deadline, the
/// subagent marker consulted by the recursion guard, and an optional
/// thinking-mode override. Derived contexts share cancellation with their
/// parent (cancelling the parent cancels every child, never the reverse).
#[derive(Debug, Clone)]
pub struct RunContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
    subagent: Option<SubagentInfo>,
    thinking: Option<ThinkingInfo>,
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RunContext {
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            deadline: None,
            subagent: None,
            thinking: None,
        }
    }

    /// Derive a context that expires `timeout` from now. The tighter of the
    /// parent deadline and the new one wins.
    pub fn with_deadline(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(existing) if existing < candidate => existing,
            _ => candidate,
        };
        Self {
            cancel: self.cancel.child_token(),
            deadline: Some(deadline),
            subagent: self.subagent.clone(),
            thinking: self.thinking,
        }
    }

    /// Derive a context marked as running inside a subagent session.
    /// Depth increments per nesting level.
    pub fn with_subagent(
        &self,
        subagent_id: impl Into<String>,
        parent_session_id: Option<String>,
    ) -> Self {
        let depth = self.subagent.as_ref().map_or(0, |s| s.depth) + 1;
        Self {
            cancel: self.cancel.child_token(),
            deadline: self.deadline,
            subagent: Some(SubagentInfo {
                subagent_id: subagent_id.into(),
                parent_session_id,
                depth,
                is_subagent: true,
            }),
            thinking: self.thinking,
        }
    }

    /// Derive a context carrying a thinking-mode override.
    pub fn with_thinking(&self, thinking: ThinkingInfo) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            deadline: self.deadline,
            subagent: self.subagent.clone(),
            thinking: Some(thinking),
        }
    }

    /// Request cooperative cancellation of this context and all children.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled() || self.deadline_elapsed()
    }

    /// Fail-fast check used between suspension points. Distinguishes an
    /// elapsed deadline from explicit cancellation.
    pub fn check(&self) -> Result<(), SleuthError> {
        if self.cancel.is_cancelled() {
            return Err(SleuthError::Cancelled);
        }
        if self.deadline_elapsed() {
            return Err(SleuthError::Timeout);
        }
        Ok(())
    }

    /// Completes when the context is cancelled or its deadline elapses.
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => {
                let sleep = tokio::time::sleep_until(tokio::time::Instant::from_std(deadline));
                tokio::select! {
                    () = self.cancel.cancelled() => {}
                    () = sleep => {}
                }
            }
            None => self.cancel.cancelled().await,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, `None` when no deadline is set.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn is_subagent(&self) -> bool {
        self.subagent.as_ref().is_some_and(|s| s.is_subagent)
    }

    pub fn subagent(&self) -> Option<&SubagentInfo> {
        self.subagent.as_ref()
    }

    pub fn depth(&self) -> usize {
        self.subagent.as_ref().map_or(0, |s| s.depth)
    }

    pub fn thinking(&self) -> Option<ThinkingInfo> {
        self.thinking
    }

    fn deadline_elapsed(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

#[cfg(test)]
mod tests;

use thiserror::Error;

/// Typed error hierarchy for sleuth.
///
/// Use at module boundaries (engine runs, admission, escalation, store access).
/// Internal/leaf functions can continue using `anyhow::Result` — the `Internal`
/// variant allows seamless conversion via the `?` operator.
///
/// Variants carry stable identities so callers can branch on the sentinel
/// without string matching.
#[derive(Debug, Error)]
pub enum SleuthError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid alert: {0}")]
    InvalidAlert(String),

    #[error("investigation already running for alert '{alert_id}'")]
    AlreadyRunning { alert_id: String },

    #[error("maximum concurrent investigations reached ({max})")]
    MaxConcurrentReached { max: usize },

    #[error("deadline exceeded")]
    Timeout,

    #[error("operation cancelled")]
    Cancelled,

    #[error("action budget exceeded ({max} actions)")]
    ActionBudgetExceeded { max: u32 },

    #[error("tool '{tool}' is not allowed")]
    ToolNotAllowed { tool: String },

    #[error("command blocked by safety policy: {command}")]
    CommandBlocked { command: String },

    #[error("agent '{name}' not found")]
    AgentNotFound { name: String },

    #[error("not found: {id}")]
    NotFound { id: String },

    #[error("duplicate id: {id}")]
    Duplicate { id: String },

    #[error("component is shut down")]
    Shutdown,

    #[error("escalation failed: {0}")]
    EscalationFailed(String),

    #[error("no escalation target configured")]
    NoEscalationTarget,

    #[error("escalation already sent for this investigation")]
    EscalationAlreadySent,

    #[error("escalation rate limit exceeded")]
    EscalationRateLimited,

    #[error("invalid escalation priority: {0}")]
    InvalidEscalationPriority(String),

    #[error("unknown alert type: {0}")]
    UnknownAlertType(String),

    #[error("no prompt builder registered for alert type '{alert_type}'")]
    PromptBuilderNotFound { alert_type: String },

    #[error("conversation error: {0}")]
    Conversation(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl SleuthError {
    /// Whether this error is transient and the operation may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::EscalationRateLimited | Self::MaxConcurrentReached { .. }
        )
    }

    /// Whether this error terminates a run by cancellation or deadline
    /// rather than by failure. Used when shaping terminal statuses.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Timeout)
    }
}

/// Convenience alias for results using `SleuthError`.
pub type SleuthResult<T> = std::result::Result<T, SleuthError>;

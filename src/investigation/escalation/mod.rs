use crate::context::RunContext;
use crate::convo::ConversationService;
use crate::errors::SleuthError;
use crate::investigation::InvestigationRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use tracing::{info, warn};
use uuid::Uuid;

/// Urgency of an escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EscalationPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl std::str::FromStr for EscalationPriority {
    type Err = SleuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(SleuthError::InvalidEscalationPriority(other.to_string())),
        }
    }
}

impl std::fmt::Display for EscalationPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone)]
pub struct EscalationRequest {
    pub investigation_id: String,
    pub reason: String,
    pub priority: EscalationPriority,
    pub summary: String,
}

/// Outcome of one escalation attempt.
#[derive(Debug, Clone)]
pub struct EscalationOutcome {
    pub success: bool,
    pub escalated_at: DateTime<Utc>,
    pub target: String,
    pub message_id: Option<String>,
    pub error: Option<String>,
}

/// Past escalation, kept per investigation.
#[derive(Debug, Clone)]
pub struct EscalationRecord {
    pub investigation_id: String,
    pub reason: String,
    pub priority: EscalationPriority,
    pub escalated_at: DateTime<Utc>,
    pub target: String,
}

/// Routes under-confident or failed investigations to operator channels.
#[async_trait]
pub trait EscalationHandler: Send + Sync {
    async fn escalate(
        &self,
        ctx: &RunContext,
        request: &EscalationRequest,
    ) -> Result<EscalationOutcome, SleuthError>;

    /// False for absent investigations and for investigations that already
    /// escalated; once false for an escalated investigation it stays false.
    fn can_escalate(&self, investigation: Option<&InvestigationRecord>) -> bool;

    /// Ordered past escalations for one investigation. Empty, never absent,
    /// for unknown ids.
    fn history(&self, investigation_id: &str) -> Vec<EscalationRecord>;
}

fn record_from(request: &EscalationRequest, target: &str) -> EscalationRecord {
    EscalationRecord {
        investigation_id: request.investigation_id.clone(),
        reason: request.reason.clone(),
        priority: request.priority,
        escalated_at: Utc::now(),
        target: target.to_string(),
    }
}

/// Handler that records escalations to the local history store and the
/// tracing pipeline. Always succeeds.
#[derive(Default)]
pub struct LogEscalationHandler {
    history: StdMutex<HashMap<String, Vec<EscalationRecord>>>,
}

impl LogEscalationHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EscalationHandler for LogEscalationHandler {
    async fn escalate(
        &self,
        _ctx: &RunContext,
        request: &EscalationRequest,
    ) -> Result<EscalationOutcome, SleuthError> {
        let record = record_from(request, "log");
        warn!(
            "ESCALATION [{}] priority={} reason={}",
            request.investigation_id, request.priority, request.reason
        );
        self.history
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .entry(request.investigation_id.clone())
            .or_default()
            .push(record.clone());
        Ok(EscalationOutcome {
            success: true,
            escalated_at: record.escalated_at,
            target: record.target,
            message_id: None,
            error: None,
        })
    }

    fn can_escalate(&self, investigation: Option<&InvestigationRecord>) -> bool {
        investigation.is_some_and(|inv| !inv.escalated)
    }

    fn history(&self, investigation_id: &str) -> Vec<EscalationRecord> {
        self.history
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(investigation_id)
            .cloned()
            .unwrap_or_default()
    }
}

/// Handler that injects an operator message into an external session.
///
/// Fails with `NoEscalationTarget` when no session is configured and with
/// `EscalationRateLimited` past the per-minute cap.
pub struct ConversationEscalationHandler {
    convo: Arc<dyn ConversationService>,
    session_id: Option<String>,
    limiter: Option<DefaultDirectRateLimiter>,
    history: StdMutex<HashMap<String, Vec<EscalationRecord>>>,
}

impl ConversationEscalationHandler {
    /// `per_minute == 0` disables rate limiting.
    pub fn new(
        convo: Arc<dyn ConversationService>,
        session_id: Option<String>,
        per_minute: u32,
    ) -> Self {
        let limiter =
            NonZeroU32::new(per_minute).map(|cap| RateLimiter::direct(Quota::per_minute(cap)));
        Self {
            convo,
            session_id,
            limiter,
            history: StdMutex::new(HashMap::new()),
        }
    }

    fn compose_message(request: &EscalationRequest) -> String {
        format!(
            "[ESCALATION] Investigation {} needs operator attention.\n\
             Priority: {}\nReason: {}\n\n{}",
            request.investigation_id, request.priority, request.reason, request.summary
        )
    }
}

#[async_trait]
impl EscalationHandler for ConversationEscalationHandler {
    async fn escalate(
        &self,
        ctx: &RunContext,
        request: &EscalationRequest,
    ) -> Result<EscalationOutcome, SleuthError> {
        ctx.check()?;
        let Some(session_id) = &self.session_id else {
            return Err(SleuthError::NoEscalationTarget);
        };
        if let Some(limiter) = &self.limiter {
            if limiter.check().is_err() {
                warn!(
                    "escalation for {} dropped: rate limit exceeded",
                    request.investigation_id
                );
                return Err(SleuthError::EscalationRateLimited);
            }
        }

        let message = Self::compose_message(request);
        self.convo
            .add_user_message(ctx, session_id, &message)
            .await
            .map_err(|e| SleuthError::EscalationFailed(format!("delivery failed: {}", e)))?;

        let record = record_from(request, session_id);
        info!(
            "escalated investigation {} to session {}",
            request.investigation_id, session_id
        );
        self.history
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .entry(request.investigation_id.clone())
            .or_default()
            .push(record.clone());
        Ok(EscalationOutcome {
            success: true,
            escalated_at: record.escalated_at,
            target: record.target,
            message_id: Some(Uuid::new_v4().to_string()),
            error: None,
        })
    }

    fn can_escalate(&self, investigation: Option<&InvestigationRecord>) -> bool {
        self.session_id.is_some() && investigation.is_some_and(|inv| !inv.escalated)
    }

    fn history(&self, investigation_id: &str) -> Vec<EscalationRecord> {
        self.history
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(investigation_id)
            .cloned()
            .unwrap_or_default()
    }
}

/// Ordered fan-out over inner handlers.
///
/// Success is the conjunction of inner successes, `can_escalate` the
/// conjunction of inner answers, history the concatenation in registration
/// order.
#[derive(Default)]
pub struct CompositeEscalationHandler {
    handlers: StdMutex<Vec<Arc<dyn EscalationHandler>>>,
}

impl CompositeEscalationHandler {
    pub fn new(handlers: Vec<Arc<dyn EscalationHandler>>) -> Self {
        Self {
            handlers: StdMutex::new(handlers),
        }
    }

    pub fn add_handler(&self, handler: Arc<dyn EscalationHandler>) {
        self.handlers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(handler);
    }

    fn snapshot(&self) -> Vec<Arc<dyn EscalationHandler>> {
        self.handlers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl EscalationHandler for CompositeEscalationHandler {
    async fn escalate(
        &self,
        ctx: &RunContext,
        request: &EscalationRequest,
    ) -> Result<EscalationOutcome, SleuthError> {
        let handlers = self.snapshot();
        let mut success = true;
        let mut errors = Vec::new();
        let mut last_target = String::new();
        let mut message_id = None;

        for handler in handlers {
            match handler.escalate(ctx, request).await {
                Ok(outcome) => {
                    success &= outcome.success;
                    last_target = outcome.target;
                    if message_id.is_none() {
                        message_id = outcome.message_id;
                    }
                }
                Err(e) => {
                    warn!(
                        "inner escalation handler failed for {}: {}",
                        request.investigation_id, e
                    );
                    success = false;
                    errors.push(e.to_string());
                }
            }
        }

        Ok(EscalationOutcome {
            success,
            escalated_at: Utc::now(),
            target: last_target,
            message_id,
            error: if errors.is_empty() {
                None
            } else {
                Some(errors.join("; "))
            },
        })
    }

    fn can_escalate(&self, investigation: Option<&InvestigationRecord>) -> bool {
        if investigation.is_none() {
            return false;
        }
        self.snapshot().iter().all(|h| h.can_escalate(investigation))
    }

    fn history(&self, investigation_id: &str) -> Vec<EscalationRecord> {
        self.snapshot()
            .iter()
            .flat_map(|h| h.history(investigation_id))
            .collect()
    }
}

pub mod escalation;
pub mod manager;
pub mod prompt;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Operational alert as produced by an external monitoring source. Input
/// only; the engine never mutates it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub source: String,
    /// Free-form severity; `"critical"` is distinguished.
    pub severity: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl Alert {
    pub fn is_critical(&self) -> bool {
        self.severity == "critical"
    }
}

/// Lifecycle of one investigation. Terminal states are sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvestigationStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Escalated,
    Cancelled,
}

impl InvestigationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Escalated | Self::Cancelled
        )
    }
}

impl std::fmt::Display for InvestigationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Escalated => "escalated",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// Persistent descriptor of one investigation, kept for history after the
/// terminal transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestigationRecord {
    pub id: String,
    pub alert_id: String,
    pub session_id: String,
    pub status: InvestigationStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub findings: Vec<String>,
    pub actions_taken: u32,
    #[serde(default)]
    pub duration: Duration,
    /// 0.0 to 1.0.
    pub confidence: f64,
    pub escalated: bool,
    pub escalate_reason: Option<String>,
    pub error: Option<String>,
}

impl InvestigationRecord {
    /// Fresh record in `Running` state for a newly admitted alert.
    pub fn started(id: impl Into<String>, alert_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            alert_id: alert_id.into(),
            session_id: String::new(),
            status: InvestigationStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            findings: Vec::new(),
            actions_taken: 0,
            duration: Duration::ZERO,
            confidence: 0.0,
            escalated: false,
            escalate_reason: None,
            error: None,
        }
    }
}

/// Result envelope for investigation consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestigationResult {
    pub investigation_id: String,
    pub alert_id: String,
    pub status: InvestigationStatus,
    pub findings: Vec<String>,
    pub actions_taken: u32,
    pub duration: Duration,
    pub confidence: f64,
    pub escalated: bool,
    pub escalate_reason: Option<String>,
    pub error: Option<String>,
}

impl From<InvestigationRecord> for InvestigationResult {
    fn from(record: InvestigationRecord) -> Self {
        Self {
            investigation_id: record.id,
            alert_id: record.alert_id,
            status: record.status,
            findings: record.findings,
            actions_taken: record.actions_taken,
            duration: record.duration,
            confidence: record.confidence,
            escalated: record.escalated,
            escalate_reason: record.escalate_reason,
            error: record.error,
        }
    }
}

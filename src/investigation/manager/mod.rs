use crate::agent::runner::AgentRunner;
use crate::agent::{AgentRunResult, AgentSource, AgentSpec};
use crate::config::InvestigationConfig;
use crate::context::RunContext;
use crate::errors::SleuthError;
use crate::investigation::escalation::{EscalationHandler, EscalationPriority, EscalationRequest};
use crate::investigation::prompt::PromptBuilderRegistry;
use crate::investigation::store::InvestigationStore;
use crate::investigation::{Alert, InvestigationRecord, InvestigationResult, InvestigationStatus};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// Confidence recorded when the agent's report omits a confidence line.
const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Cap on the output excerpt used as escalation summary.
const SUMMARY_MAX_CHARS: usize = 400;

const INVESTIGATOR_SYSTEM_PROMPT: &str = "\
You are an autonomous incident investigator. You diagnose operational \
alerts by inspecting the affected systems with the tools provided.

Rules:
1. Diagnose only; never attempt remediation or configuration changes
2. Prefer cheap, read-only checks before expensive ones
3. Every claim in your report must be backed by observed command output
4. End with a `Findings:` bullet list and a `Confidence: <0.0-1.0>` line";

/// Owns the set of active investigations: admission (capacity cap and
/// duplicate-alert suppression), lifecycle, escalation and shutdown.
pub struct InvestigationManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    config: InvestigationConfig,
    runner: Arc<AgentRunner>,
    prompts: Arc<PromptBuilderRegistry>,
    escalation: Arc<dyn EscalationHandler>,
    store: Arc<InvestigationStore>,
    state: StdMutex<ManagerState>,
    active_count: AtomicUsize,
}

#[derive(Default)]
struct ManagerState {
    active: HashMap<String, ActiveInvestigation>,
    by_alert: HashMap<String, String>,
    closed: bool,
}

#[derive(Clone)]
struct ActiveInvestigation {
    id: String,
    alert_id: String,
    cancel: CancellationToken,
    done: watch::Receiver<bool>,
}

impl ManagerInner {
    fn state(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remove an investigation from the active maps. Only the path that
    /// actually removes the entry decrements the counter.
    fn deregister(&self, id: &str, alert_id: &str) {
        let mut state = self.state();
        if state.active.remove(id).is_some() {
            state.by_alert.remove(alert_id);
            self.active_count.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl InvestigationManager {
    pub fn new(
        config: InvestigationConfig,
        runner: Arc<AgentRunner>,
        prompts: Arc<PromptBuilderRegistry>,
        escalation: Arc<dyn EscalationHandler>,
        store: Arc<InvestigationStore>,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                config,
                runner,
                prompts,
                escalation,
                store,
                state: StdMutex::new(ManagerState::default()),
                active_count: AtomicUsize::new(0),
            }),
        }
    }

    /// Convenience: start an investigation and await its terminal state.
    pub async fn handle_alert(
        &self,
        ctx: &RunContext,
        alert: &Alert,
    ) -> Result<InvestigationResult, SleuthError> {
        let id = self.start_investigation(ctx, alert).await?;
        self.await_terminal(ctx, &id).await?;
        let record = self.inner.store.get(ctx, &id).await?;
        Ok(InvestigationResult::from(record))
    }

    /// Start an investigation for alerts that qualify for automatic
    /// handling. Returns `None` when the alert does not qualify.
    pub async fn auto_start(
        &self,
        ctx: &RunContext,
        alert: &Alert,
    ) -> Result<Option<String>, SleuthError> {
        if !(self.inner.config.auto_start_for_critical && alert.is_critical()) {
            return Ok(None);
        }
        self.start_investigation(ctx, alert).await.map(Some)
    }

    /// Atomically admit an alert and kick off its investigation worker.
    pub async fn start_investigation(
        &self,
        ctx: &RunContext,
        alert: &Alert,
    ) -> Result<String, SleuthError> {
        if alert.id.is_empty() {
            return Err(SleuthError::InvalidAlert(
                "alert id must not be empty".into(),
            ));
        }
        ctx.check()?;

        // The worker context is owned by the manager; it is cancelled by
        // stop/shutdown, not by the admitting caller returning.
        let ictx = RunContext::new().with_deadline(self.inner.config.max_duration());
        let (done_tx, done_rx) = watch::channel(false);
        let id = format!("inv-{}", &Uuid::new_v4().to_string()[..8]);

        // Admission is atomic: duplicate check, capacity check and
        // registration happen under one lock, never across an await.
        {
            let mut state = self.inner.state();
            if state.closed {
                return Err(SleuthError::Shutdown);
            }
            if state.by_alert.contains_key(&alert.id) {
                return Err(SleuthError::AlreadyRunning {
                    alert_id: alert.id.clone(),
                });
            }
            if self.inner.active_count.load(Ordering::SeqCst) >= self.inner.config.max_concurrent {
                return Err(SleuthError::MaxConcurrentReached {
                    max: self.inner.config.max_concurrent,
                });
            }
            state.active.insert(
                id.clone(),
                ActiveInvestigation {
                    id: id.clone(),
                    alert_id: alert.id.clone(),
                    cancel: ictx.cancellation_token(),
                    done: done_rx,
                },
            );
            state.by_alert.insert(alert.id.clone(), id.clone());
            self.inner.active_count.fetch_add(1, Ordering::SeqCst);
        }

        let record = InvestigationRecord::started(&id, &alert.id);
        if let Err(e) = self.inner.store.store(&record) {
            self.inner.deregister(&id, &alert.id);
            return Err(e);
        }

        info!("investigation {} admitted for alert '{}'", id, alert.id);
        let inner = self.inner.clone();
        let alert = alert.clone();
        let worker_id = id.clone();
        tokio::spawn(async move {
            run_investigation(inner, alert, worker_id, ictx, done_tx).await;
        });
        Ok(id)
    }

    /// Cancel a running investigation and wait for its terminal transition
    /// to be recorded. Unknown ids fail with `NotFound`; already-terminal
    /// investigations resolve quietly.
    pub async fn stop_investigation(&self, ctx: &RunContext, id: &str) -> Result<(), SleuthError> {
        let entry = { self.inner.state().active.get(id).cloned() };
        match entry {
            Some(active) => {
                info!("stopping investigation {}", id);
                active.cancel.cancel();
                let mut done = active.done;
                tokio::select! {
                    res = done.wait_for(|finished| *finished) => {
                        let _ = res;
                        Ok(())
                    }
                    () = ctx.done() => Err(context_error(ctx)),
                }
            }
            None => self.inner.store.get(ctx, id).await.map(|_| ()),
        }
    }

    pub async fn get_investigation_status(
        &self,
        ctx: &RunContext,
        id: &str,
    ) -> Result<InvestigationRecord, SleuthError> {
        self.inner.store.get(ctx, id).await
    }

    /// Sorted snapshot of currently-active investigation ids.
    pub fn list_active_investigations(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.state().active.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn get_active_count(&self) -> usize {
        self.inner.active_count.load(Ordering::SeqCst)
    }

    /// Idempotent: cancels every active investigation, waits for their
    /// terminal transitions bounded by the caller's context, and drains the
    /// active map. Subsequent admissions fail with `Shutdown`.
    pub async fn shutdown(&self, ctx: &RunContext) -> Result<(), SleuthError> {
        let entries: Vec<ActiveInvestigation> = {
            let mut state = self.inner.state();
            state.closed = true;
            state.active.values().cloned().collect()
        };
        info!(
            "shutting down investigation manager ({} active)",
            entries.len()
        );

        for entry in &entries {
            entry.cancel.cancel();
        }
        for entry in &entries {
            let mut done = entry.done.clone();
            tokio::select! {
                res = done.wait_for(|finished| *finished) => {
                    let _ = res;
                }
                () = ctx.done() => {
                    warn!(
                        "shutdown wait cut short by caller deadline; {} still finishing",
                        entry.id
                    );
                    break;
                }
            }
        }

        // Force out stragglers that have not deregistered themselves.
        {
            let mut state = self.inner.state();
            let leftover: Vec<(String, String)> = state
                .active
                .values()
                .map(|a| (a.id.clone(), a.alert_id.clone()))
                .collect();
            for (id, alert_id) in leftover {
                if state.active.remove(&id).is_some() {
                    state.by_alert.remove(&alert_id);
                    self.inner.active_count.fetch_sub(1, Ordering::SeqCst);
                }
            }
        }
        Ok(())
    }

    async fn await_terminal(&self, ctx: &RunContext, id: &str) -> Result<(), SleuthError> {
        let done = { self.inner.state().active.get(id).map(|a| a.done.clone()) };
        let Some(mut done) = done else {
            // Worker already deregistered; the terminal state is recorded.
            return Ok(());
        };
        tokio::select! {
            res = done.wait_for(|finished| *finished) => {
                let _ = res;
                Ok(())
            }
            () = ctx.done() => Err(context_error(ctx)),
        }
    }
}

fn context_error(ctx: &RunContext) -> SleuthError {
    match ctx.check() {
        Err(e) => e,
        Ok(()) => SleuthError::Cancelled,
    }
}

async fn run_investigation(
    inner: Arc<ManagerInner>,
    alert: Alert,
    id: String,
    ictx: RunContext,
    done_tx: watch::Sender<bool>,
) {
    finish_investigation(&inner, &alert, &id, &ictx).await;
    inner.deregister(&id, &alert.id);
    let _ = done_tx.send(true);
}

/// Drive the agent session and record the terminal transition. Escalates
/// when the result confidence is below the configured threshold or the
/// tool-error count exceeds its limit.
async fn finish_investigation(inner: &ManagerInner, alert: &Alert, id: &str, ictx: &RunContext) {
    let mut record = match inner.store.get(&RunContext::new(), id).await {
        Ok(record) => record,
        Err(e) => {
            warn!("investigation {} record missing at run start: {}", id, e);
            return;
        }
    };

    let outcome = investigate(inner, alert, id, ictx).await;
    record.completed_at = Some(Utc::now());

    match outcome {
        Ok(result) => {
            record.session_id = result.subagent_id.clone();
            record.actions_taken = result.actions_taken;
            record.duration = result.duration;
            record.findings = parse_findings(&result.output);
            record.confidence = parse_confidence(&result.output).unwrap_or(DEFAULT_CONFIDENCE);

            if let Some(reason) = escalation_reason(&inner.config, &record, &result) {
                if inner.escalation.can_escalate(Some(&record)) {
                    let request = EscalationRequest {
                        investigation_id: id.to_string(),
                        reason: reason.clone(),
                        priority: if alert.is_critical() {
                            EscalationPriority::Critical
                        } else {
                            EscalationPriority::High
                        },
                        summary: record
                            .findings
                            .first()
                            .cloned()
                            .unwrap_or_else(|| truncated(&result.output, SUMMARY_MAX_CHARS)),
                    };
                    match inner.escalation.escalate(ictx, &request).await {
                        Ok(outcome) if outcome.success => {
                            info!("investigation {} escalated: {}", id, reason);
                        }
                        Ok(_) => warn!("investigation {} escalation partially failed", id),
                        Err(e) => warn!("investigation {} escalation failed: {}", id, e),
                    }
                }
                record.status = InvestigationStatus::Escalated;
                record.escalated = true;
                record.escalate_reason = Some(reason);
            } else {
                record.status = InvestigationStatus::Completed;
            }
            info!(
                "investigation {} finished: {} ({} actions, confidence {:.2})",
                id, record.status, record.actions_taken, record.confidence
            );
        }
        Err(e) => {
            record.status = if e.is_cancellation() {
                InvestigationStatus::Cancelled
            } else {
                InvestigationStatus::Failed
            };
            record.duration = (Utc::now() - record.started_at).to_std().unwrap_or_default();
            record.error = Some(e.to_string());
            warn!("investigation {} {}: {}", id, record.status, e);
        }
    }

    if let Err(e) = inner.store.update(&record) {
        warn!(
            "failed to record terminal state for investigation {}: {}",
            id, e
        );
    }
}

async fn investigate(
    inner: &ManagerInner,
    alert: &Alert,
    id: &str,
    ictx: &RunContext,
) -> Result<AgentRunResult, SleuthError> {
    let prompt = inner.prompts.build_prompt_for_alert(alert)?;
    let agent = investigator_agent(&inner.config);
    inner.runner.run(ictx, &agent, &prompt, id).await
}

fn investigator_agent(config: &InvestigationConfig) -> AgentSpec {
    AgentSpec {
        name: "investigator".into(),
        description: "Autonomous alert investigator".into(),
        raw_system_prompt: INVESTIGATOR_SYSTEM_PROMPT.into(),
        model: config.model.clone(),
        max_actions: config.max_actions,
        allowed_tools: if config.enable_safety_checks {
            config.allowed_tools.clone()
        } else {
            None
        },
        thinking_enabled: None,
        thinking_budget: 0,
        source: AgentSource::Dynamic,
    }
}

fn escalation_reason(
    config: &InvestigationConfig,
    record: &InvestigationRecord,
    result: &AgentRunResult,
) -> Option<String> {
    if record.confidence < config.escalate_on_confidence {
        return Some(format!(
            "confidence {:.2} below threshold {:.2}",
            record.confidence, config.escalate_on_confidence
        ));
    }
    if result.tool_errors > config.escalate_on_errors {
        return Some(format!(
            "{} tool errors exceeded limit {}",
            result.tool_errors, config.escalate_on_errors
        ));
    }
    None
}

/// Extract the `Confidence: <value>` line from the agent's report.
/// Accepts bare floats and percentages; out-of-range values are clamped.
fn parse_confidence(output: &str) -> Option<f64> {
    for line in output.lines() {
        let trimmed = line.trim().trim_start_matches("- ");
        let lower = trimmed.to_lowercase();
        if let Some(rest) = lower.strip_prefix("confidence:") {
            let rest = rest.trim().trim_end_matches('%');
            if let Ok(value) = rest.parse::<f64>() {
                let value = if value > 1.0 { value / 100.0 } else { value };
                return Some(value.clamp(0.0, 1.0));
            }
        }
    }
    None
}

/// Collect `- ` bullet lines from the report as findings, skipping the
/// confidence line when it is itself rendered as a bullet.
fn parse_findings(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.trim().strip_prefix("- "))
        .map(|finding| finding.trim().to_string())
        .filter(|finding| {
            !finding.is_empty() && !finding.to_lowercase().starts_with("confidence:")
        })
        .collect()
}

fn truncated(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests;

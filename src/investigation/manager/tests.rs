use super::*;
use crate::config::EngineConfig;
use crate::convo::{AssistantTurn, ConversationService, Message, ThinkingInfo};
use crate::investigation::escalation::LogEscalationHandler;
use crate::provider::ModelProvider;
use crate::tools::{ToolCall, ToolDescriptor, ToolExecutor, ToolResult};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

const REPORT: &str = "Root cause identified.\n\nFindings:\n- disk 94% full on /var\n- log rotation disabled\n\nConfidence: 0.9";

/// How the mock conversation behaves when asked for an assistant turn.
enum Behavior {
    /// Answer immediately with this report text.
    Report(String),
    /// Block until the context is cancelled.
    Stall,
    /// Fail with this error message.
    Fail(String),
}

struct ScriptedConvo {
    behavior: Behavior,
}

impl ScriptedConvo {
    fn report(text: &str) -> Arc<Self> {
        Arc::new(Self {
            behavior: Behavior::Report(text.to_string()),
        })
    }

    fn stalling() -> Arc<Self> {
        Arc::new(Self {
            behavior: Behavior::Stall,
        })
    }

    fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            behavior: Behavior::Fail(message.to_string()),
        })
    }
}

#[async_trait]
impl ConversationService for ScriptedConvo {
    async fn start_conversation(&self, _ctx: &RunContext) -> anyhow::Result<String> {
        Ok("sess-0".to_string())
    }

    async fn add_user_message(
        &self,
        _ctx: &RunContext,
        _session_id: &str,
        content: &str,
    ) -> anyhow::Result<Message> {
        Ok(Message::user(content))
    }

    async fn process_assistant_response(
        &self,
        ctx: &RunContext,
        _session_id: &str,
    ) -> anyhow::Result<AssistantTurn> {
        match &self.behavior {
            Behavior::Report(text) => Ok(AssistantTurn {
                message: Message::assistant(text.clone()),
                tool_calls: vec![],
            }),
            Behavior::Stall => {
                let token = ctx.cancellation_token();
                tokio::select! {
                    () = tokio::time::sleep(Duration::from_secs(300)) => {
                        Ok(AssistantTurn::default())
                    }
                    () = token.cancelled() => {
                        anyhow::bail!("session interrupted")
                    }
                }
            }
            Behavior::Fail(message) => anyhow::bail!(message.clone()),
        }
    }

    async fn add_tool_results(
        &self,
        _ctx: &RunContext,
        _session_id: &str,
        _results: &[ToolResult],
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn end_conversation(&self, _session_id: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn set_system_prompt(
        &self,
        _ctx: &RunContext,
        _session_id: &str,
        _content: &str,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    fn set_thinking_mode(&self, _session_id: &str, _info: ThinkingInfo) -> anyhow::Result<()> {
        Ok(())
    }

    fn get_thinking_mode(&self, _session_id: &str) -> ThinkingInfo {
        ThinkingInfo::default()
    }
}

struct StaticProvider;

impl ModelProvider for StaticProvider {
    fn current_model(&self) -> String {
        "static-model".to_string()
    }

    fn set_model(&self, _model: &str) {}
}

struct NoopExecutor;

#[async_trait]
impl ToolExecutor for NoopExecutor {
    async fn execute(&self, _ctx: &RunContext, _call: &ToolCall) -> anyhow::Result<String> {
        Ok("ok".to_string())
    }

    fn list_tools(&self) -> Vec<String> {
        vec![]
    }

    fn get_tool(&self, _name: &str) -> Option<ToolDescriptor> {
        None
    }

    fn validate_input(&self, _name: &str, _input: &Value) -> anyhow::Result<()> {
        Ok(())
    }
}

fn alert(id: &str) -> Alert {
    Alert {
        id: id.into(),
        source: "prometheus".into(),
        severity: "warning".into(),
        title: "HighMemoryUsage".into(),
        description: "memory above 95% for 10m".into(),
        labels: HashMap::new(),
    }
}

fn critical_alert(id: &str) -> Alert {
    let mut a = alert(id);
    a.severity = "critical".into();
    a
}

struct Fixture {
    manager: InvestigationManager,
    store: Arc<InvestigationStore>,
    escalation: Arc<LogEscalationHandler>,
}

fn fixture(convo: Arc<dyn ConversationService>, config: InvestigationConfig) -> Fixture {
    let runner = Arc::new(AgentRunner::new(
        convo,
        Arc::new(StaticProvider),
        Arc::new(NoopExecutor),
        None,
        EngineConfig::default(),
    ));
    let store = Arc::new(InvestigationStore::new());
    let escalation = Arc::new(LogEscalationHandler::new());
    let manager = InvestigationManager::new(
        config,
        runner,
        Arc::new(PromptBuilderRegistry::new()),
        escalation.clone(),
        store.clone(),
    );
    Fixture {
        manager,
        store,
        escalation,
    }
}

#[tokio::test]
async fn handle_alert_completes_and_parses_report() {
    let fx = fixture(ScriptedConvo::report(REPORT), InvestigationConfig::default());
    let ctx = RunContext::new();

    let result = fx.manager.handle_alert(&ctx, &alert("alert-1")).await.unwrap();
    assert_eq!(result.status, InvestigationStatus::Completed);
    assert_eq!(result.alert_id, "alert-1");
    assert_eq!(
        result.findings,
        vec![
            "disk 94% full on /var".to_string(),
            "log rotation disabled".to_string()
        ]
    );
    assert!((result.confidence - 0.9).abs() < 1e-9);
    assert!(!result.escalated);
    assert_eq!(fx.manager.get_active_count(), 0);
    assert!(fx.manager.list_active_investigations().is_empty());

    // The terminal record is kept for history.
    let record = fx.store.get(&ctx, &result.investigation_id).await.unwrap();
    assert_eq!(record.status, InvestigationStatus::Completed);
    assert!(record.completed_at.is_some());
}

#[tokio::test]
async fn low_confidence_escalates() {
    let fx = fixture(
        ScriptedConvo::report("Findings:\n- inconclusive probe\n\nConfidence: 0.2"),
        InvestigationConfig::default(),
    );
    let ctx = RunContext::new();

    let result = fx.manager.handle_alert(&ctx, &alert("alert-1")).await.unwrap();
    assert_eq!(result.status, InvestigationStatus::Escalated);
    assert!(result.escalated);
    assert!(result.escalate_reason.unwrap().contains("confidence"));
    assert_eq!(fx.escalation.history(&result.investigation_id).len(), 1);
}

#[tokio::test]
async fn missing_confidence_defaults_below_threshold() {
    let mut config = InvestigationConfig::default();
    config.escalate_on_confidence = 0.6;
    let fx = fixture(ScriptedConvo::report("Findings:\n- nothing conclusive"), config);

    let result = fx
        .manager
        .handle_alert(&RunContext::new(), &alert("alert-1"))
        .await
        .unwrap();
    // Default 0.5 is below the 0.6 threshold.
    assert_eq!(result.status, InvestigationStatus::Escalated);
}

#[tokio::test]
async fn failed_run_records_failure() {
    let fx = fixture(
        ScriptedConvo::failing("provider down"),
        InvestigationConfig::default(),
    );

    let result = fx
        .manager
        .handle_alert(&RunContext::new(), &alert("alert-1"))
        .await
        .unwrap();
    assert_eq!(result.status, InvestigationStatus::Failed);
    assert!(result.error.unwrap().contains("provider down"));
    assert_eq!(fx.manager.get_active_count(), 0);
}

#[tokio::test]
async fn duplicate_alert_suppressed() {
    let fx = fixture(ScriptedConvo::stalling(), InvestigationConfig::default());
    let ctx = RunContext::new();

    let id = fx
        .manager
        .start_investigation(&ctx, &alert("alert-1"))
        .await
        .unwrap();
    let err = fx
        .manager
        .start_investigation(&ctx, &alert("alert-1"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SleuthError::AlreadyRunning { alert_id } if alert_id == "alert-1"
    ));
    assert_eq!(fx.manager.get_active_count(), 1);

    fx.manager.stop_investigation(&ctx, &id).await.unwrap();
}

#[tokio::test]
async fn concurrent_admissions_for_same_alert_admit_once() {
    let fx = std::sync::Arc::new(fixture(
        ScriptedConvo::stalling(),
        InvestigationConfig::default(),
    ));
    let ctx = RunContext::new();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let fx = fx.clone();
        let ctx = ctx.clone();
        handles.push(tokio::spawn(async move {
            fx.manager.start_investigation(&ctx, &alert("alert-1")).await
        }));
    }
    let mut ok = 0;
    let mut already_running = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => ok += 1,
            Err(SleuthError::AlreadyRunning { .. }) => already_running += 1,
            Err(other) => panic!("unexpected admission error: {}", other),
        }
    }
    assert_eq!(ok, 1);
    assert_eq!(already_running, 7);
    assert_eq!(fx.manager.get_active_count(), 1);
}

#[tokio::test]
async fn capacity_cap_rejects_new_alerts() {
    let mut config = InvestigationConfig::default();
    config.max_concurrent = 1;
    let fx = fixture(ScriptedConvo::stalling(), config);
    let ctx = RunContext::new();

    fx.manager
        .start_investigation(&ctx, &alert("alert-1"))
        .await
        .unwrap();
    let err = fx
        .manager
        .start_investigation(&ctx, &alert("alert-2"))
        .await
        .unwrap_err();
    assert!(matches!(err, SleuthError::MaxConcurrentReached { max: 1 }));
    assert_eq!(fx.manager.get_active_count(), 1);
}

#[tokio::test]
async fn stop_investigation_cancels_and_records() {
    let fx = fixture(ScriptedConvo::stalling(), InvestigationConfig::default());
    let ctx = RunContext::new();

    let id = fx
        .manager
        .start_investigation(&ctx, &alert("alert-1"))
        .await
        .unwrap();
    assert_eq!(fx.manager.list_active_investigations(), vec![id.clone()]);

    fx.manager.stop_investigation(&ctx, &id).await.unwrap();

    let record = fx.manager.get_investigation_status(&ctx, &id).await.unwrap();
    assert_eq!(record.status, InvestigationStatus::Cancelled);
    assert_eq!(fx.manager.get_active_count(), 0);

    // Stopping a terminal investigation is a quiet no-op.
    fx.manager.stop_investigation(&ctx, &id).await.unwrap();
}

#[tokio::test]
async fn stop_unknown_investigation_is_not_found() {
    let fx = fixture(ScriptedConvo::stalling(), InvestigationConfig::default());
    let err = fx
        .manager
        .stop_investigation(&RunContext::new(), "ghost")
        .await
        .unwrap_err();
    assert!(matches!(err, SleuthError::NotFound { .. }));
}

#[tokio::test]
async fn empty_alert_id_rejected() {
    let fx = fixture(ScriptedConvo::stalling(), InvestigationConfig::default());
    let err = fx
        .manager
        .start_investigation(&RunContext::new(), &alert(""))
        .await
        .unwrap_err();
    assert!(matches!(err, SleuthError::InvalidAlert(_)));
    assert_eq!(fx.manager.get_active_count(), 0);
}

#[tokio::test]
async fn auto_start_gates_on_severity() {
    let fx = fixture(ScriptedConvo::stalling(), InvestigationConfig::default());
    let ctx = RunContext::new();

    assert!(
        fx.manager
            .auto_start(&ctx, &alert("alert-1"))
            .await
            .unwrap()
            .is_none()
    );
    let id = fx
        .manager
        .auto_start(&ctx, &critical_alert("alert-2"))
        .await
        .unwrap();
    assert!(id.is_some());
}

#[tokio::test]
async fn auto_start_disabled_ignores_critical() {
    let mut config = InvestigationConfig::default();
    config.auto_start_for_critical = false;
    let fx = fixture(ScriptedConvo::stalling(), config);

    let started = fx
        .manager
        .auto_start(&RunContext::new(), &critical_alert("alert-1"))
        .await
        .unwrap();
    assert!(started.is_none());
}

#[tokio::test]
async fn shutdown_cancels_everything_and_closes_admission() {
    let fx = fixture(ScriptedConvo::stalling(), InvestigationConfig::default());
    let ctx = RunContext::new();

    let id_a = fx
        .manager
        .start_investigation(&ctx, &alert("alert-1"))
        .await
        .unwrap();
    let id_b = fx
        .manager
        .start_investigation(&ctx, &alert("alert-2"))
        .await
        .unwrap();
    assert_eq!(fx.manager.get_active_count(), 2);

    tokio::time::timeout(Duration::from_secs(5), fx.manager.shutdown(&ctx))
        .await
        .expect("shutdown should not hang")
        .unwrap();

    assert_eq!(fx.manager.get_active_count(), 0);
    assert!(fx.manager.list_active_investigations().is_empty());
    for id in [&id_a, &id_b] {
        let record = fx.manager.get_investigation_status(&ctx, id).await.unwrap();
        assert_eq!(record.status, InvestigationStatus::Cancelled);
    }

    let err = fx
        .manager
        .start_investigation(&ctx, &alert("alert-3"))
        .await
        .unwrap_err();
    assert!(matches!(err, SleuthError::Shutdown));

    // Idempotent.
    fx.manager.shutdown(&ctx).await.unwrap();
}

#[test]
fn confidence_parsing_formats() {
    assert_eq!(parse_confidence("Confidence: 0.8"), Some(0.8));
    assert_eq!(parse_confidence("confidence: 85%"), Some(0.85));
    assert_eq!(parse_confidence("- Confidence: 0.4"), Some(0.4));
    assert_eq!(parse_confidence("Confidence: 7"), Some(0.07));
    assert_eq!(parse_confidence("no report"), None);
    assert_eq!(parse_confidence("Confidence: high"), None);
}

#[test]
fn findings_parsing_skips_confidence_bullet() {
    let report = "Findings:\n- disk full\n- Confidence: 0.9\n-   \n- rotation disabled";
    assert_eq!(
        parse_findings(report),
        vec!["disk full".to_string(), "rotation disabled".to_string()]
    );
}

#[test]
fn investigator_agent_respects_safety_toggle() {
    let mut config = InvestigationConfig::default();
    config.allowed_tools = Some(vec!["bash".into()]);
    let agent = investigator_agent(&config);
    assert_eq!(agent.allowed_tools, Some(vec!["bash".to_string()]));

    config.enable_safety_checks = false;
    let agent = investigator_agent(&config);
    assert!(agent.allowed_tools.is_none());
}

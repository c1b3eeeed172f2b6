use crate::convo::ThinkingInfo;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Static defaults for extended thinking, overridable per agent and per
/// context at run time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThinkingConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_thinking_budget")]
    pub budget_tokens: u32,
    #[serde(default)]
    pub show_thinking: bool,
}

impl Default for ThinkingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            budget_tokens: default_thinking_budget(),
            show_thinking: false,
        }
    }
}

impl ThinkingConfig {
    pub fn as_info(&self) -> ThinkingInfo {
        ThinkingInfo {
            enabled: self.enabled,
            budget_tokens: self.budget_tokens,
            show_thinking: self.show_thinking,
        }
    }
}

fn default_thinking_budget() -> u32 {
    4096
}

/// Engine-level settings shared by every run regardless of orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Action budget applied when an agent spec leaves `max_actions` at 0.
    #[serde(default = "default_max_actions")]
    pub default_max_actions: u32,
    /// Remaining-turn count at which the detailed warning fires.
    #[serde(default = "default_warning_threshold")]
    pub warning_threshold: u32,
    /// Batch-capable tool recommended in the detailed turn warning.
    #[serde(default)]
    pub batch_tool_hint: Option<String>,
    /// Tool names treated as task delegation, refused in subagent contexts.
    #[serde(default = "default_delegation_tools")]
    pub delegation_tools: Vec<String>,
    /// Command fragments blocked for shell-style tools.
    #[serde(default)]
    pub blocked_commands: Vec<String>,
    #[serde(default)]
    pub thinking: ThinkingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_max_actions: default_max_actions(),
            warning_threshold: default_warning_threshold(),
            batch_tool_hint: None,
            delegation_tools: default_delegation_tools(),
            blocked_commands: Vec::new(),
            thinking: ThinkingConfig::default(),
        }
    }
}

fn default_max_actions() -> u32 {
    20
}

fn default_warning_threshold() -> u32 {
    5
}

fn default_delegation_tools() -> Vec<String> {
    vec!["task".to_string()]
}

/// Caps and toggles for the investigation manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestigationConfig {
    #[serde(default = "default_max_actions")]
    pub max_actions: u32,
    /// Wall-clock bound for a single investigation, enforced as a deadline
    /// on the investigation's context.
    #[serde(default = "default_max_duration_secs")]
    pub max_duration_secs: u64,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// `None` permits all tools; an empty list blocks all of them.
    #[serde(default)]
    pub allowed_tools: Option<Vec<String>>,
    #[serde(default = "default_blocked_commands")]
    pub blocked_commands: Vec<String>,
    /// Confidence threshold below which a completed investigation escalates.
    #[serde(default = "default_escalate_on_confidence")]
    pub escalate_on_confidence: f64,
    /// Tool-error count above which an investigation escalates.
    #[serde(default = "default_escalate_on_errors")]
    pub escalate_on_errors: u32,
    #[serde(default = "default_true")]
    pub auto_start_for_critical: bool,
    #[serde(default = "default_true")]
    pub enable_safety_checks: bool,
    /// Model for the investigator agent (shorthand or full id; "inherit"
    /// keeps the provider's current model).
    #[serde(default = "default_model")]
    pub model: String,
}

impl Default for InvestigationConfig {
    fn default() -> Self {
        Self {
            max_actions: default_max_actions(),
            max_duration_secs: default_max_duration_secs(),
            max_concurrent: default_max_concurrent(),
            allowed_tools: None,
            blocked_commands: default_blocked_commands(),
            escalate_on_confidence: default_escalate_on_confidence(),
            escalate_on_errors: default_escalate_on_errors(),
            auto_start_for_critical: true,
            enable_safety_checks: true,
            model: default_model(),
        }
    }
}

impl InvestigationConfig {
    pub fn max_duration(&self) -> Duration {
        Duration::from_secs(self.max_duration_secs)
    }
}

fn default_max_duration_secs() -> u64 {
    600
}

fn default_max_concurrent() -> usize {
    3
}

fn default_blocked_commands() -> Vec<String> {
    ["rm -rf", "mkfs", "dd if=", "shutdown", "reboot"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_escalate_on_confidence() -> f64 {
    0.5
}

fn default_escalate_on_errors() -> u32 {
    3
}

fn default_true() -> bool {
    true
}

fn default_model() -> String {
    "inherit".to_string()
}

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub investigation: InvestigationConfig,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.engine.default_max_actions == 0 {
            anyhow::bail!("engine.default_max_actions must be > 0");
        }
        if self.engine.warning_threshold == 0 {
            anyhow::bail!("engine.warning_threshold must be > 0");
        }
        if self.investigation.max_concurrent == 0 {
            anyhow::bail!("investigation.max_concurrent must be > 0");
        }
        if self.investigation.max_duration_secs == 0 {
            anyhow::bail!("investigation.max_duration_secs must be > 0");
        }
        if !(0.0..=1.0).contains(&self.investigation.escalate_on_confidence) {
            anyhow::bail!("investigation.escalate_on_confidence must be within 0..=1");
        }
        Ok(())
    }
}

/// Load configuration from a JSON file, falling back to defaults when the
/// file does not exist.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) if path.exists() => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("failed to read config from {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("failed to parse config JSON from {}", path.display()))?
        }
        _ => Config::default(),
    };
    config
        .validate()
        .with_context(|| "configuration validation failed")?;
    Ok(config)
}
